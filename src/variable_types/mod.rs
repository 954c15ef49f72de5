mod errors;
mod fromstr;
mod type_methods;
mod value_methods;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

pub use errors::ValueError;

/// Types simples UPnP, tels que déclarés dans l'élément `dataType` d'une
/// table d'état SCPD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Ui1,
    Ui2,
    Ui4,
    I1,
    I2,
    I4,
    Int,
    R4,
    R8,
    Number,
    Fixed14_4,
    Float,
    Char,
    String,
    Boolean,
    BinBase64,
    BinHex,
    Date,
    DateTime,
    DateTimeTz,
    Time,
    TimeTz,
    Uuid,
    Uri,
}

/// Valeur typée d'une variable d'état.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Ui1(u8),
    Ui2(u16),
    Ui4(u32),
    I1(i8),
    I2(i16),
    I4(i32),
    Int(i32),
    R4(f32),
    R8(f64),
    Number(f64),
    Fixed14_4(f64),
    Float(f64),
    Char(char),
    String(String),
    Boolean(bool),
    BinBase64(String),
    BinHex(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Time(NaiveTime),
    TimeTz(DateTime<FixedOffset>),
    Uuid(Uuid),
    Uri(Url),
}
