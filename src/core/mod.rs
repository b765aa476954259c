pub mod protocol;

use core::fmt;

/// Address of one sensor on the shared SDI-12 line.
///
/// A single printable character in `[0-9A-Za-z]`, fixed at configuration
/// time. Ordering is lexicographic over the raw byte, which determines the
/// polling order within a measurement cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct SensorAddress(u8);

impl SensorAddress {
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

/// Error for an address outside the printable alphanumeric alphabet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidAddress(pub char);

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid sensor address {:?}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidAddress {}

impl core::convert::TryFrom<char> for SensorAddress {
    type Error = InvalidAddress;

    fn try_from(ch: char) -> Result<Self, Self::Error> {
        if ch.is_ascii_alphanumeric() {
            Ok(Self(ch as u8))
        } else {
            Err(InvalidAddress(ch))
        }
    }
}

impl fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// (Thermodynamic) Temperature.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Temperature(f64);

impl Temperature {
    pub const fn from_celsius(celsius: f64) -> Self {
        Self(celsius)
    }

    pub const fn as_celsius(self) -> f64 {
        self.0
    }
}

impl From<f64> for Temperature {
    fn from(from: f64) -> Self {
        Temperature(from)
    }
}

impl From<Temperature> for f64 {
    fn from(from: Temperature) -> Self {
        from.0
    }
}

/// Volumetric water content (VWC).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct VolumetricWaterContent(f64);

impl VolumetricWaterContent {
    pub const fn from_percent(percent: f64) -> Self {
        Self(percent)
    }

    pub const fn as_percent(self) -> f64 {
        self.0
    }

    pub const fn min_percent() -> f64 {
        0.0
    }

    pub const fn max_percent() -> f64 {
        100.0
    }

    pub fn is_valid(self) -> bool {
        self.0 >= Self::min_percent() && self.0 <= Self::max_percent()
    }
}

/// Round to one decimal place, half away from zero.
///
/// Implemented with integer casts so that the calibration transforms stay
/// available without `std` float intrinsics.
fn round_tenths(value: f64) -> f64 {
    let scaled = value * 10.0;
    let adjusted = if scaled >= 0.0 {
        scaled + 0.5
    } else {
        scaled - 0.5
    };
    (adjusted as i64) as f64 / 10.0
}

/// Calibrated linear transform for mineral substrate, as a percentage with
/// one decimal of precision.
pub fn linear_vwc_percent(raw: f64) -> f64 {
    round_tenths(((-0.0018 * raw) + 35.619) * 100.0)
}

/// Alternative cubic transform for soilless substrate. Unrounded.
pub fn soilless_vwc_percent(raw: f64) -> f64 {
    let raw2 = raw * raw;
    let raw3 = raw2 * raw;
    100.0 * (6.771e-10 * raw3 - 5.105e-6 * raw2 + 1.302e-2 * raw - 10.848)
}

/// Selects how raw moisture counts map to volumetric water content.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Calibration {
    /// The default calibrated linear transform.
    CustomLinear,
    /// Cubic transform for soilless substrate.
    Soilless,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration::CustomLinear
    }
}

impl Calibration {
    /// Water content for a raw moisture reading, rounded to one decimal.
    pub fn vwc_from_raw(self, raw: f64) -> VolumetricWaterContent {
        let percent = match self {
            Calibration::CustomLinear => linear_vwc_percent(raw),
            Calibration::Soilless => round_tenths(soilless_vwc_percent(raw)),
        };
        VolumetricWaterContent::from_percent(percent)
    }
}

/// Physical quantities derived from one sensor's raw readings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalculatedMeasurement {
    pub temperature: Temperature,
    pub water_content: VolumetricWaterContent,
}

/// Convert the raw values of one data frame into physical units.
///
/// Expects at least three values (moisture counts, temperature, bulk
/// conductivity); temperature passes through unconverted and the
/// conductivity is not used downstream. Returns `None` for shorter frames.
pub fn calculate(values: &[f64], calibration: Calibration) -> Option<CalculatedMeasurement> {
    if values.len() < 3 {
        return None;
    }
    Some(CalculatedMeasurement {
        temperature: Temperature::from_celsius(values[1]),
        water_content: calibration.vwc_from_raw(values[0]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::TryFrom;

    #[test]
    fn address_alphabet() {
        for ch in "059AZaz".chars() {
            assert!(SensorAddress::try_from(ch).is_ok());
        }
        for ch in ",! \r?".chars() {
            assert_eq!(SensorAddress::try_from(ch), Err(InvalidAddress(ch)));
        }
    }

    #[test]
    fn address_ordering_is_lexicographic() {
        let mut addresses: Vec<_> = "3A1z2"
            .chars()
            .map(|ch| SensorAddress::try_from(ch).unwrap())
            .collect();
        addresses.sort();
        let sorted: Vec<_> = addresses.iter().map(|a| a.as_char()).collect();
        assert_eq!(sorted, vec!['1', '2', '3', 'A', 'z']);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn linear_calibration_literal_points() {
        // Literal formula: round(((-0.0018 * raw) + 35.619) * 100, 1)
        assert_eq!(linear_vwc_percent(0.0), 3561.9);
        assert_eq!(linear_vwc_percent(19649.5), 25.0);
        assert_eq!(linear_vwc_percent(19705.0), 15.0);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn soilless_calibration_rounds_via_enum() {
        // 100 * (6.771e-10 raw^3 - 5.105e-6 raw^2 + 1.302e-2 raw - 10.848)
        // at raw = 2000 gives 18.88, one-decimal rounded to 18.9.
        let vwc = Calibration::Soilless.vwc_from_raw(2000.0);
        assert_eq!(vwc.as_percent(), 18.9);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn rounding_half_away_from_zero() {
        assert_eq!(round_tenths(24.99), 25.0);
        assert_eq!(round_tenths(24.94), 24.9);
        assert_eq!(round_tenths(-3.55), -3.6);
        assert_eq!(round_tenths(0.0), 0.0);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn calculate_uses_first_two_values() {
        let values = [19705.0, 22.4, 350.0];
        let calc = calculate(&values, Calibration::CustomLinear).unwrap();
        assert_eq!(calc.temperature.as_celsius(), 22.4);
        assert_eq!(calc.water_content.as_percent(), 15.0);
    }

    #[test]
    fn calculate_rejects_short_frames() {
        assert_eq!(calculate(&[], Calibration::CustomLinear), None);
        assert_eq!(calculate(&[1.0, 2.0], Calibration::CustomLinear), None);
    }

    #[test]
    fn water_content_validity_range() {
        assert!(VolumetricWaterContent::from_percent(0.0).is_valid());
        assert!(VolumetricWaterContent::from_percent(100.0).is_valid());
        assert!(!VolumetricWaterContent::from_percent(-0.5).is_valid());
        assert!(!VolumetricWaterContent::from_percent(100.01).is_valid());
    }
}
