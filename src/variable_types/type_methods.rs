//! Méthodes de `VarType` : correspondance avec les noms SCPD et valeurs par
//! défaut.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::{Value, ValueError, VarType};

impl VarType {
    /// Analyse un nom de type tel qu'il apparaît dans `<dataType>`.
    pub fn from_name(name: &str) -> Result<Self, ValueError> {
        Ok(match name.trim() {
            "ui1" => VarType::Ui1,
            "ui2" => VarType::Ui2,
            "ui4" => VarType::Ui4,
            "i1" => VarType::I1,
            "i2" => VarType::I2,
            "i4" => VarType::I4,
            "int" => VarType::Int,
            "r4" => VarType::R4,
            "r8" => VarType::R8,
            "number" => VarType::Number,
            "fixed.14.4" => VarType::Fixed14_4,
            "float" => VarType::Float,
            "char" => VarType::Char,
            "string" => VarType::String,
            "boolean" => VarType::Boolean,
            "bin.base64" => VarType::BinBase64,
            "bin.hex" => VarType::BinHex,
            "date" => VarType::Date,
            "dateTime" => VarType::DateTime,
            "dateTime.tz" => VarType::DateTimeTz,
            "time" => VarType::Time,
            "time.tz" => VarType::TimeTz,
            "uuid" => VarType::Uuid,
            "uri" => VarType::Uri,
            other => return Err(ValueError::UnknownType(other.to_string())),
        })
    }

    /// Le nom SCPD du type.
    pub fn name(&self) -> &'static str {
        match self {
            VarType::Ui1 => "ui1",
            VarType::Ui2 => "ui2",
            VarType::Ui4 => "ui4",
            VarType::I1 => "i1",
            VarType::I2 => "i2",
            VarType::I4 => "i4",
            VarType::Int => "int",
            VarType::R4 => "r4",
            VarType::R8 => "r8",
            VarType::Number => "number",
            VarType::Fixed14_4 => "fixed.14.4",
            VarType::Float => "float",
            VarType::Char => "char",
            VarType::String => "string",
            VarType::Boolean => "boolean",
            VarType::BinBase64 => "bin.base64",
            VarType::BinHex => "bin.hex",
            VarType::Date => "date",
            VarType::DateTime => "dateTime",
            VarType::DateTimeTz => "dateTime.tz",
            VarType::Time => "time",
            VarType::TimeTz => "time.tz",
            VarType::Uuid => "uuid",
            VarType::Uri => "uri",
        }
    }

    /// Vrai pour les types ordonnés numériquement (éligibles à
    /// `allowedValueRange`).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            VarType::Ui1
                | VarType::Ui2
                | VarType::Ui4
                | VarType::I1
                | VarType::I2
                | VarType::I4
                | VarType::Int
                | VarType::R4
                | VarType::R8
                | VarType::Number
                | VarType::Fixed14_4
                | VarType::Float
        )
    }

    /// Valeur initiale d'une variable sans `defaultValue` déclarée.
    pub fn zero_value(&self) -> Value {
        match self {
            VarType::Ui1 => Value::Ui1(0),
            VarType::Ui2 => Value::Ui2(0),
            VarType::Ui4 => Value::Ui4(0),
            VarType::I1 => Value::I1(0),
            VarType::I2 => Value::I2(0),
            VarType::I4 => Value::I4(0),
            VarType::Int => Value::Int(0),
            VarType::R4 => Value::R4(0.0),
            VarType::R8 => Value::R8(0.0),
            VarType::Number => Value::Number(0.0),
            VarType::Fixed14_4 => Value::Fixed14_4(0.0),
            VarType::Float => Value::Float(0.0),
            VarType::Char => Value::Char('\0'),
            VarType::String => Value::String(String::new()),
            VarType::Boolean => Value::Boolean(false),
            VarType::BinBase64 => Value::BinBase64(String::new()),
            VarType::BinHex => Value::BinHex(String::new()),
            VarType::Date => Value::Date(NaiveDate::default()),
            VarType::DateTime => Value::DateTime(NaiveDateTime::default()),
            VarType::DateTimeTz => Value::DateTimeTz(Default::default()),
            VarType::Time => Value::Time(NaiveTime::default()),
            VarType::TimeTz => Value::TimeTz(Default::default()),
            VarType::Uuid => Value::Uuid(uuid::Uuid::nil()),
            VarType::Uri => Value::Uri(url::Url::parse("about:blank").unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for name in [
            "ui1", "ui2", "ui4", "i1", "i2", "i4", "int", "r4", "r8", "number",
            "fixed.14.4", "float", "char", "string", "boolean", "bin.base64",
            "bin.hex", "date", "dateTime", "dateTime.tz", "time", "time.tz",
            "uuid", "uri",
        ] {
            let ty = VarType::from_name(name).unwrap();
            assert_eq!(ty.name(), name);
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(VarType::from_name("decimal").is_err());
    }

    #[test]
    fn test_zero_value_matches_type() {
        assert_eq!(VarType::Ui4.zero_value(), Value::Ui4(0));
        assert_eq!(VarType::Boolean.zero_value(), Value::Boolean(false));
    }
}
