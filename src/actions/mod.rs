mod action_methods;
mod errors;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use errors::ActionError;

use crate::variable_types::Value;

/// Sens d'un argument d'action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Argument d'action : nom, sens, variable d'état associée, drapeau retval.
#[derive(Debug, Clone)]
pub struct Argument {
    name: String,
    direction: Direction,
    related_state_variable: String,
    retval: bool,
}

/// Action d'un service : nom et liste ordonnée d'arguments.
///
/// L'entité invocable côté device host est un [`ActionHandler`] installé sur
/// le service ; côté control point l'invocation est marshallée en SOAP et
/// l'action ne porte que sa signature.
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    arguments: Vec<Argument>,
}

/// Entrées d'une invocation, indexées par nom d'argument.
pub type ActionInputs = HashMap<String, Value>;

/// Sorties d'une invocation, dans l'ordre de déclaration des arguments.
pub type ActionOutputs = Vec<(String, Value)>;

/// Capacité d'invocation installée par action : entrées en entrée, sorties ou
/// fault UPnP en sortie.
pub type ActionHandler = Arc<
    dyn Fn(ActionInputs) -> Pin<Box<dyn Future<Output = Result<ActionOutputs, ActionError>> + Send>>
        + Send
        + Sync,
>;
