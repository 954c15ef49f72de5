//! Analyse des SCPD (Service Control Protocol Definition).

use std::io::BufReader;

use tracing::warn;
use xmltree::Element;

use super::{DescriptionError, SERVICE_NS};
use crate::actions::{Action, Argument, Direction};
use crate::state_variables::{EventingMode, StateVariable};
use crate::value_ranges::{AllowedValueList, ValueRange};
use crate::variable_types::{Value, VarType};

/// Contenu d'un SCPD : actions et table d'état.
#[derive(Debug, Clone, Default)]
pub struct Scpd {
    pub actions: Vec<Action>,
    pub variables: Vec<StateVariable>,
}

/// Analyse un document SCPD.
///
/// # Errors
///
/// `InvalidServiceDescription` : élément racine inattendu, type de donnée
/// inconnu, variable référencée absente, plage `min > max` ou `step ≤ 0`.
pub fn parse_scpd(xml: &[u8]) -> Result<Scpd, DescriptionError> {
    let root = Element::parse(BufReader::new(xml))
        .map_err(|e| DescriptionError::service("scpd", e.to_string()))?;

    if root.name != "scpd" {
        return Err(DescriptionError::service(
            &root.name,
            "document root element must be 'scpd'",
        ));
    }
    if root.namespace.as_deref() != Some(SERVICE_NS) {
        warn!(
            "❓ SCPD has namespace {:?}, expected {}",
            root.namespace, SERVICE_NS
        );
    }

    let variables = parse_state_table(&root)?;
    let actions = parse_action_list(&root, &variables)?;

    Ok(Scpd { actions, variables })
}

fn parse_state_table(root: &Element) -> Result<Vec<StateVariable>, DescriptionError> {
    let mut variables = Vec::new();

    let Some(table) = root.get_child("serviceStateTable") else {
        return Ok(variables);
    };

    for var_elem in table.children.iter().filter_map(|n| n.as_element()) {
        if var_elem.name != "stateVariable" {
            continue;
        }

        let name = required(var_elem, "name")?;
        let type_name = required(var_elem, "dataType")?;
        let var_type = VarType::from_name(&type_name)
            .map_err(|e| DescriptionError::service(&name, e.to_string()))?;

        // sendEvents vaut "yes" par défaut (UDA §2.3).
        let send_events = var_elem
            .attributes
            .get("sendEvents")
            .map(|v| v.trim().eq_ignore_ascii_case("yes"))
            .unwrap_or(true);
        let multicast = var_elem
            .attributes
            .get("multicast")
            .map(|v| v.trim().eq_ignore_ascii_case("yes"))
            .unwrap_or(false);

        let eventing = match (send_events, multicast) {
            (false, _) => EventingMode::No,
            (true, false) => EventingMode::Yes,
            (true, true) => EventingMode::Multicast,
        };

        let mut variable = StateVariable::new(&name, var_type).with_eventing(eventing);

        if let Some(default) = child_text(var_elem, "defaultValue") {
            match Value::parse(&default, var_type) {
                Ok(value) => variable = variable.with_default(value),
                Err(e) => warn!("❓ defaultValue of '{}' unusable: {}", name, e),
            }
        }

        if let Some(list_elem) = var_elem.get_child("allowedValueList") {
            let values: Vec<String> = list_elem
                .children
                .iter()
                .filter_map(|n| n.as_element())
                .filter(|e| e.name == "allowedValue")
                .filter_map(|e| e.get_text().map(|t| t.trim().to_string()))
                .collect();
            variable = variable.with_allowed_values(AllowedValueList::new(values));
        }

        if let Some(range_elem) = var_elem.get_child("allowedValueRange") {
            let min = child_text(range_elem, "minimum")
                .ok_or_else(|| DescriptionError::service(&name, "allowedValueRange without minimum"))?;
            let max = child_text(range_elem, "maximum")
                .ok_or_else(|| DescriptionError::service(&name, "allowedValueRange without maximum"))?;
            let step = child_text(range_elem, "step");

            let range = ValueRange::from_strings(var_type, &min, &max, step.as_deref())
                .map_err(|e| DescriptionError::service(&name, e.to_string()))?;
            variable = variable.with_range(range);
        }

        variables.push(variable);
    }

    Ok(variables)
}

fn parse_action_list(
    root: &Element,
    variables: &[StateVariable],
) -> Result<Vec<Action>, DescriptionError> {
    let mut actions = Vec::new();

    let Some(list) = root.get_child("actionList") else {
        return Ok(actions);
    };

    for action_elem in list.children.iter().filter_map(|n| n.as_element()) {
        if action_elem.name != "action" {
            continue;
        }

        let name = required(action_elem, "name")?;
        let mut arguments = Vec::new();

        if let Some(arg_list) = action_elem.get_child("argumentList") {
            for arg_elem in arg_list.children.iter().filter_map(|n| n.as_element()) {
                if arg_elem.name != "argument" {
                    continue;
                }

                let arg_name = required(arg_elem, "name")?;
                let direction = match required(arg_elem, "direction")?.as_str() {
                    "in" => Direction::In,
                    "out" => Direction::Out,
                    other => {
                        return Err(DescriptionError::service(
                            &arg_name,
                            format!("invalid direction '{}'", other),
                        ))
                    }
                };
                let related = required(arg_elem, "relatedStateVariable")?;

                // Intégrité référentielle : la variable liée doit exister.
                if !variables.iter().any(|v| v.name() == related) {
                    return Err(DescriptionError::service(
                        &name,
                        format!("argument '{}' references unknown state variable '{}'", arg_name, related),
                    ));
                }

                let mut argument = Argument::new(&arg_name, direction, &related);
                if arg_elem.get_child("retval").is_some() {
                    argument = argument.as_retval();
                }
                arguments.push(argument);
            }
        }

        let action = Action::new(&name, arguments)
            .map_err(|e| DescriptionError::service(&name, e.to_string()))?;
        actions.push(action);
    }

    Ok(actions)
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn required(elem: &Element, name: &str) -> Result<String, DescriptionError> {
    child_text(elem, name)
        .ok_or_else(|| DescriptionError::service(name, "mandatory element missing or empty"))
}
