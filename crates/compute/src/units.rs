use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Meters,
    Kilometers,
}

impl DistanceUnit {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meters" | "metres" | "meter" | "m" => Some(DistanceUnit::Meters),
            "kilometers" | "kilometres" | "kilometer" | "km" => Some(DistanceUnit::Kilometers),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceUnit::Meters => "meters",
            DistanceUnit::Kilometers => "kilometers",
        }
    }

    pub fn to_meters(self, value: f64) -> f64 {
        match self {
            DistanceUnit::Meters => value,
            DistanceUnit::Kilometers => value * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DistanceUnit;

    #[test]
    fn parses_aliases_and_converts() {
        assert_eq!(DistanceUnit::parse("KM"), Some(DistanceUnit::Kilometers));
        assert_eq!(DistanceUnit::parse("meters"), Some(DistanceUnit::Meters));
        assert_eq!(DistanceUnit::parse("furlongs"), None);
        assert_eq!(DistanceUnit::Kilometers.to_meters(1.5), 1500.0);
        assert_eq!(DistanceUnit::default(), DistanceUnit::Meters);
    }
}
