//! Serde helpers for protojson 64-bit integer encoding.
//!
//! protojson carries `fixed64`/`int64` values as decimal strings to survive
//! JSON implementations that truncate large integers, while accepting plain
//! numbers on input. These modules are meant for `#[serde(with = "...")]`.

/// `u64` as a decimal string, accepting string or number on input.
pub mod u64_as_string {
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = u64;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("an unsigned 64-bit integer or its decimal string form")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
                Ok(value)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
                u64::try_from(value)
                    .map_err(|_| E::custom(format!("negative value {value} for unsigned field")))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// `i64` as a decimal string, accepting string or number on input.
pub mod i64_as_string {
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = i64;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a signed 64-bit integer or its decimal string form")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
                Ok(value)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
                i64::try_from(value)
                    .map_err(|_| E::custom(format!("value {value} overflows signed field")))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<i64, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::u64_as_string")]
        unsigned: u64,
        #[serde(with = "super::i64_as_string")]
        signed: i64,
    }

    #[test]
    fn round_trips_through_strings() {
        let sample = Sample {
            unsigned: u64::MAX,
            signed: -42,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"unsigned":"18446744073709551615","signed":"-42"}"#);
        assert_eq!(serde_json::from_str::<Sample>(&json).unwrap(), sample);
    }

    #[test]
    fn accepts_plain_numbers() {
        let sample: Sample = serde_json::from_str(r#"{"unsigned":7,"signed":-7}"#).unwrap();
        assert_eq!(sample.unsigned, 7);
        assert_eq!(sample.signed, -7);
    }

    #[test]
    fn rejects_negative_unsigned() {
        assert!(serde_json::from_str::<Sample>(r#"{"unsigned":-1,"signed":0}"#).is_err());
    }
}
