//! Analyse des valeurs depuis leur forme texte UPnP.

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

use super::{Value, ValueError, VarType};

impl Value {
    /// Analyse `s` selon le type attendu.
    ///
    /// Les booléens acceptent `1/0`, `true/false` et `yes/no` comme le veut
    /// l'UDA. Les dates et heures suivent ISO 8601.
    ///
    /// # Errors
    ///
    /// `ValueError::InvalidValue` si la chaîne ne se convertit pas.
    pub fn parse(s: &str, ty: VarType) -> Result<Value, ValueError> {
        let err = || ValueError::invalid(ty.name(), s);
        let s = s.trim();

        Ok(match ty {
            VarType::Ui1 => Value::Ui1(s.parse().map_err(|_| err())?),
            VarType::Ui2 => Value::Ui2(s.parse().map_err(|_| err())?),
            VarType::Ui4 => Value::Ui4(s.parse().map_err(|_| err())?),
            VarType::I1 => Value::I1(s.parse().map_err(|_| err())?),
            VarType::I2 => Value::I2(s.parse().map_err(|_| err())?),
            VarType::I4 => Value::I4(s.parse().map_err(|_| err())?),
            VarType::Int => Value::Int(s.parse().map_err(|_| err())?),
            VarType::R4 => Value::R4(s.parse().map_err(|_| err())?),
            VarType::R8 => Value::R8(s.parse().map_err(|_| err())?),
            VarType::Number => Value::Number(s.parse().map_err(|_| err())?),
            VarType::Fixed14_4 => Value::Fixed14_4(s.parse().map_err(|_| err())?),
            VarType::Float => Value::Float(s.parse().map_err(|_| err())?),
            VarType::Char => {
                let mut chars = s.chars();
                let c = chars.next().ok_or_else(err)?;
                if chars.next().is_some() {
                    return Err(err());
                }
                Value::Char(c)
            }
            VarType::String => Value::String(s.to_string()),
            VarType::Boolean => Value::Boolean(parse_boolean(s).ok_or_else(err)?),
            VarType::BinBase64 => {
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|_| err())?;
                Value::BinBase64(s.to_string())
            }
            VarType::BinHex => {
                if s.len() % 2 != 0 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(err());
                }
                Value::BinHex(s.to_string())
            }
            VarType::Date => Value::Date(
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| err())?,
            ),
            VarType::DateTime => Value::DateTime(parse_datetime(s).ok_or_else(err)?),
            VarType::DateTimeTz => {
                Value::DateTimeTz(DateTime::parse_from_rfc3339(s).map_err(|_| err())?)
            }
            VarType::Time => Value::Time(parse_time(s).ok_or_else(err)?),
            VarType::TimeTz => {
                // Pas de date dans la forme texte : on l'ancre à l'époque pour
                // conserver l'offset.
                let anchored = format!("1970-01-01T{}", s);
                Value::TimeTz(
                    DateTime::parse_from_str(&anchored, "%Y-%m-%dT%H:%M:%S%:z")
                        .or_else(|_| DateTime::parse_from_str(&anchored, "%Y-%m-%dT%H:%M:%S%z"))
                        .map_err(|_| err())?,
                )
            }
            VarType::Uuid => Value::Uuid(Uuid::parse_str(s).map_err(|_| err())?),
            VarType::Uri => Value::Uri(Url::parse(s).map_err(|_| err())?),
        })
    }
}

fn parse_boolean(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        assert_eq!(Value::parse("42", VarType::Ui4).unwrap(), Value::Ui4(42));
        assert_eq!(Value::parse("-7", VarType::I2).unwrap(), Value::I2(-7));
        assert!(Value::parse("-1", VarType::Ui1).is_err());
        assert!(Value::parse("300", VarType::Ui1).is_err());
    }

    #[test]
    fn test_parse_boolean_forms() {
        for s in ["1", "true", "yes", "TRUE"] {
            assert_eq!(Value::parse(s, VarType::Boolean).unwrap(), Value::Boolean(true));
        }
        for s in ["0", "false", "no"] {
            assert_eq!(Value::parse(s, VarType::Boolean).unwrap(), Value::Boolean(false));
        }
        assert!(Value::parse("maybe", VarType::Boolean).is_err());
    }

    #[test]
    fn test_parse_date_and_time() {
        assert!(Value::parse("2024-02-29", VarType::Date).is_ok());
        assert!(Value::parse("2024-02-30", VarType::Date).is_err());
        assert!(Value::parse("2024-01-01T10:30:00", VarType::DateTime).is_ok());
        assert!(Value::parse("12:34:56", VarType::Time).is_ok());
    }

    #[test]
    fn test_parse_bin_types() {
        assert!(Value::parse("aGVsbG8=", VarType::BinBase64).is_ok());
        assert!(Value::parse("not base64 !", VarType::BinBase64).is_err());
        assert!(Value::parse("deadBEEF", VarType::BinHex).is_ok());
        assert!(Value::parse("xyz", VarType::BinHex).is_err());
    }

    #[test]
    fn test_parse_uri_and_uuid() {
        assert!(Value::parse("http://example.com/a", VarType::Uri).is_ok());
        assert!(Value::parse("5a2c4b7e-0000-0000-0000-000000000001", VarType::Uuid).is_ok());
        assert!(Value::parse("not-a-uuid", VarType::Uuid).is_err());
    }

    #[test]
    fn test_char_rejects_multiple() {
        assert_eq!(Value::parse("x", VarType::Char).unwrap(), Value::Char('x'));
        assert!(Value::parse("xy", VarType::Char).is_err());
    }
}
