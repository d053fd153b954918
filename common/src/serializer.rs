// Serde helpers for byte fields.
//
// Row keys and values are arbitrary bytes but in practice almost always
// printable. They are written as plain strings when they are valid UTF-8 and
// as `hex:<digits>` otherwise, so scripts and artifacts stay readable.

const HEX_PREFIX: &str = "hex:";

fn encode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.starts_with(HEX_PREFIX) => s.to_owned(),
        _ => format!("{}{}", HEX_PREFIX, hex::encode(bytes)),
    }
}

fn decode(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    match value.strip_prefix(HEX_PREFIX) {
        Some(digits) => hex::decode(digits),
        None => Ok(value.as_bytes().to_vec()),
    }
}

/// `#[serde(with = "bytes_str")]` for `Vec<u8>`
pub mod bytes_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::decode(&value).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "opt_bytes_str")]` for `Option<Vec<u8>>`
pub mod opt_bytes_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&super::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        value
            .map(|v| super::decode(&v).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// `#[serde(with = "vec_bytes_str")]` for `Vec<Vec<u8>>`
pub mod vec_bytes_str {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(keys: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&super::encode(key))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let values = Vec::<String>::deserialize(deserializer)?;
        values
            .iter()
            .map(|v| super::decode(v).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Milliseconds on the wire, `Duration` in memory
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Optional milliseconds on the wire
pub mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&(d.as_millis().min(u128::from(u64::MAX)) as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
