//! Physical constants consumed when building discharge curves.

/// Molar gas constant, J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314_462_618;

/// Faraday constant, C/mol.
pub const FARADAY: f64 = 96_485.332_12;

/// Reference cell temperature, K (25 °C).
pub const REFERENCE_TEMPERATURE: f64 = 298.15;

/// Thermal voltage `R·T/F` in volts at `temperature` kelvin.
pub fn thermal_voltage(temperature: f64) -> f64 {
    GAS_CONSTANT * temperature / FARADAY
}
