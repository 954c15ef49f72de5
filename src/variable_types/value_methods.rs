//! Méthodes de `Value` : type, comparaison numérique, forme texte.

use std::fmt;

use super::{Value, VarType};

impl Value {
    /// Le type UPnP de cette valeur.
    pub fn var_type(&self) -> VarType {
        match self {
            Value::Ui1(_) => VarType::Ui1,
            Value::Ui2(_) => VarType::Ui2,
            Value::Ui4(_) => VarType::Ui4,
            Value::I1(_) => VarType::I1,
            Value::I2(_) => VarType::I2,
            Value::I4(_) => VarType::I4,
            Value::Int(_) => VarType::Int,
            Value::R4(_) => VarType::R4,
            Value::R8(_) => VarType::R8,
            Value::Number(_) => VarType::Number,
            Value::Fixed14_4(_) => VarType::Fixed14_4,
            Value::Float(_) => VarType::Float,
            Value::Char(_) => VarType::Char,
            Value::String(_) => VarType::String,
            Value::Boolean(_) => VarType::Boolean,
            Value::BinBase64(_) => VarType::BinBase64,
            Value::BinHex(_) => VarType::BinHex,
            Value::Date(_) => VarType::Date,
            Value::DateTime(_) => VarType::DateTime,
            Value::DateTimeTz(_) => VarType::DateTimeTz,
            Value::Time(_) => VarType::Time,
            Value::TimeTz(_) => VarType::TimeTz,
            Value::Uuid(_) => VarType::Uuid,
            Value::Uri(_) => VarType::Uri,
        }
    }

    /// Projection numérique pour la validation de plages.
    ///
    /// `None` pour les types non numériques.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Value::Ui1(v) => f64::from(*v),
            Value::Ui2(v) => f64::from(*v),
            Value::Ui4(v) => f64::from(*v),
            Value::I1(v) => f64::from(*v),
            Value::I2(v) => f64::from(*v),
            Value::I4(v) | Value::Int(v) => f64::from(*v),
            Value::R4(v) => f64::from(*v),
            Value::R8(v) | Value::Number(v) | Value::Fixed14_4(v) | Value::Float(v) => *v,
            _ => return None,
        })
    }

    /// La forme texte émise sur le réseau (SOAP, propertyset GENA, SCPD).
    pub fn to_upnp_string(&self) -> String {
        match self {
            Value::Ui1(v) => v.to_string(),
            Value::Ui2(v) => v.to_string(),
            Value::Ui4(v) => v.to_string(),
            Value::I1(v) => v.to_string(),
            Value::I2(v) => v.to_string(),
            Value::I4(v) | Value::Int(v) => v.to_string(),
            Value::R4(v) => v.to_string(),
            Value::R8(v) | Value::Number(v) | Value::Float(v) => v.to_string(),
            Value::Fixed14_4(v) => format!("{:.4}", v),
            Value::Char(c) => c.to_string(),
            Value::String(s) => s.clone(),
            Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Value::BinBase64(s) | Value::BinHex(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Value::DateTimeTz(dt) => dt.to_rfc3339(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::TimeTz(dt) => dt.format("%H:%M:%S%:z").to_string(),
            Value::Uuid(u) => u.as_hyphenated().to_string(),
            Value::Uri(u) => u.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_upnp_string())
    }
}
