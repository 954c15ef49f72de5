mod methods;

use crate::variable_types::Value;

/// Plage de valeurs autorisées (`allowedValueRange`) d'une variable d'état
/// numérique.
#[derive(Debug, Clone)]
pub struct ValueRange {
    min: Value,
    max: Value,
    step: Option<Value>,
}

/// Liste de valeurs autorisées (`allowedValueList`) d'une variable de type
/// `string`.
#[derive(Debug, Clone, Default)]
pub struct AllowedValueList {
    values: Vec<String>,
}
