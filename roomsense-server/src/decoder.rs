use roomsense_api::LightStatus;
use serde_json::{Map, Value};

use crate::configs::settings::Topics;

const STRUCTURED_KEYS: [&str; 4] = ["temperature", "humidity", "light", "light_status"];

/// Partial reading decoded from one message. Absent fields leave the
/// snapshot untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingUpdate {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_status: Option<LightStatus>,
}

impl ReadingUpdate {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.light_status.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Temperature,
    Humidity,
    Light,
}

/// Turns `(topic, payload)` pairs into reading updates.
///
/// Policy, first match wins:
/// 1. a JSON object carrying any of `temperature`, `humidity`, `light`, `light_status`
/// 2. a scalar on a topic naming a field, exact configured topics before substrings
/// 3. a bare on/off token, read as light status
#[derive(Debug, Clone)]
pub struct Decoder {
    temperature_topic: String,
    humidity_topic: String,
    light_topic: String,
}

impl Decoder {
    pub fn new(topics: &Topics) -> Self {
        Self {
            temperature_topic: topics.temperature.clone(),
            humidity_topic: topics.humidity.clone(),
            light_topic: topics.light.clone(),
        }
    }

    pub fn decode(&self, topic: &str, payload: &[u8]) -> Option<ReadingUpdate> {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim();

        let update = if let Some(update) = decode_structured(text) {
            update
        } else if let Some(field) = self.classify(topic) {
            decode_scalar(field, text)
        } else {
            ReadingUpdate {
                light_status: LightStatus::from_token(&unquote(text)),
                ..Default::default()
            }
        };

        if update.is_empty() {
            tracing::debug!("Ignored message on {}: {}", topic, text);
            return None;
        }

        Some(update)
    }

    fn classify(&self, topic: &str) -> Option<Field> {
        if topic == self.temperature_topic {
            return Some(Field::Temperature);
        }
        if topic == self.humidity_topic {
            return Some(Field::Humidity);
        }
        if topic == self.light_topic {
            return Some(Field::Light);
        }

        let topic = topic.to_lowercase();
        [
            ("temperature", Field::Temperature),
            ("humidity", Field::Humidity),
            ("light", Field::Light),
        ]
        .into_iter()
        .find(|(name, _)| topic.contains(name))
        .map(|(_, field)| field)
    }
}

fn decode_structured(text: &str) -> Option<ReadingUpdate> {
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) else {
        return None;
    };

    if !STRUCTURED_KEYS.iter().any(|key| object.contains_key(*key)) {
        return None;
    }

    Some(ReadingUpdate {
        temperature: number_field(&object, "temperature"),
        humidity: number_field(&object, "humidity"),
        light_status: object
            .get("light_status")
            .or_else(|| object.get("light"))
            .and_then(coerce_light),
    })
}

fn decode_scalar(field: Field, text: &str) -> ReadingUpdate {
    let raw = unquote(text);

    match field {
        Field::Temperature => ReadingUpdate {
            temperature: parse_number(&raw),
            ..Default::default()
        },
        Field::Humidity => ReadingUpdate {
            humidity: parse_number(&raw),
            ..Default::default()
        },
        Field::Light => ReadingUpdate {
            light_status: LightStatus::from_token(&raw),
            ..Default::default()
        },
    }
}

fn number_field(object: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = object.get(key)?;

    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    };

    if number.is_none() && !value.is_null() {
        tracing::warn!("Dropped non-numeric {}: {}", key, value);
    }

    number
}

fn coerce_light(value: &Value) -> Option<LightStatus> {
    match value {
        Value::Bool(b) => Some(LightStatus::from(*b)),
        Value::String(s) => LightStatus::from_token(s),
        Value::Number(n) => LightStatus::from_token(&n.to_string()),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Strips JSON string quoting, `"on"` becomes `on`.
fn unquote(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(s)) => s,
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> Decoder {
        Decoder::new(&Topics {
            all: "home/living_room/#".to_string(),
            temperature: "home/living_room/temperature".to_string(),
            humidity: "home/living_room/humidity".to_string(),
            light: "home/living_room/light".to_string(),
        })
    }

    #[test]
    fn test_structured_payload() {
        let update = decoder()
            .decode(
                "home/living_room/sensor",
                br#"{"temperature":24.5,"humidity":55.0,"light_status":"unknown"}"#,
            )
            .unwrap();

        assert_eq!(update.temperature, Some(24.5));
        assert_eq!(update.humidity, Some(55.0));
        assert_eq!(update.light_status, Some(LightStatus::Unknown));
    }

    #[test]
    fn test_numeric_string_is_coerced() {
        let update = decoder()
            .decode("home/living_room/sensor", br#"{"temperature": "24.5"}"#)
            .unwrap();

        assert_eq!(
            update,
            ReadingUpdate {
                temperature: Some(24.5),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_non_numeric_field_dropped_others_kept() {
        let update = decoder()
            .decode("home/living_room/sensor", br#"{"temperature":"warm","humidity":40,"light":true}"#)
            .unwrap();

        assert_eq!(update.temperature, None);
        assert_eq!(update.humidity, Some(40.0));
        assert_eq!(update.light_status, Some(LightStatus::On));
    }

    #[test]
    fn test_null_fields_are_absent() {
        let update = decoder()
            .decode("home/living_room/sensor", br#"{"temperature":null,"humidity":61.2,"light_status":"off"}"#)
            .unwrap();

        assert_eq!(update.temperature, None);
        assert_eq!(update.humidity, Some(61.2));
        assert_eq!(update.light_status, Some(LightStatus::Off));
    }

    #[test]
    fn test_light_status_wins_over_light() {
        let update = decoder()
            .decode("home/living_room/sensor", br#"{"light":"on","light_status":"off"}"#)
            .unwrap();

        assert_eq!(update.light_status, Some(LightStatus::Off));
    }

    #[test]
    fn test_scalar_on_exact_topics() {
        let decoder = decoder();

        assert_eq!(
            decoder.decode("home/living_room/temperature", b"21.5").unwrap().temperature,
            Some(21.5)
        );
        assert_eq!(
            decoder.decode("home/living_room/humidity", b" 48 ").unwrap().humidity,
            Some(48.0)
        );
        assert_eq!(
            decoder.decode("home/living_room/light", b"on").unwrap().light_status,
            Some(LightStatus::On)
        );
        assert_eq!(
            decoder.decode("home/living_room/light", br#""OFF""#).unwrap().light_status,
            Some(LightStatus::Off)
        );
    }

    #[test]
    fn test_substring_topics_in_fixed_order() {
        let decoder = decoder();

        assert_eq!(
            decoder.decode("garage/Temperature/raw", b"12").unwrap().temperature,
            Some(12.0)
        );
        // Matches both "temperature" and "light", temperature is checked first
        assert_eq!(
            decoder.decode("lab/light_temperature", b"30").unwrap().temperature,
            Some(30.0)
        );
    }

    #[test]
    fn test_exact_topic_beats_substring() {
        let decoder = Decoder::new(&Topics {
            all: "#".to_string(),
            temperature: "t".to_string(),
            humidity: "h".to_string(),
            light: "room/temperature_light".to_string(),
        });

        let update = decoder.decode("room/temperature_light", b"1").unwrap();

        assert_eq!(update.light_status, Some(LightStatus::On));
        assert_eq!(update.temperature, None);
    }

    #[test]
    fn test_bad_scalar_is_ignored() {
        let decoder = decoder();

        assert!(decoder.decode("home/living_room/temperature", b"NaN").is_none());
        assert!(decoder.decode("home/living_room/temperature", b"hot").is_none());
        assert!(decoder.decode("home/living_room/light", b"dim").is_none());
    }

    #[test]
    fn test_bare_token_elsewhere_sets_light() {
        let decoder = decoder();

        assert_eq!(
            decoder.decode("home/living_room/switch", b"Yes").unwrap().light_status,
            Some(LightStatus::On)
        );
        assert!(decoder.decode("home/living_room/switch", b"hello").is_none());
    }

    #[test]
    fn test_object_without_known_keys_is_ignored() {
        assert!(decoder().decode("home/living_room/sensor", br#"{"pressure":1013}"#).is_none());
    }
}
