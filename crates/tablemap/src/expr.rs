//! Expression builder for key-condition, filter, condition, and update
//! expressions.
//!
//! Attribute names and operand values are never inlined: every reference
//! goes through generated `#n…`/`:v…` placeholders, which keeps expressions
//! safe against attribute names that collide with the store's reserved
//! words. Operator/clause compatibility is checked here, before any request
//! is built.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use tablemap_core::value::Value;
use tablemap_core::{Error, Result};

use crate::codec::encode_dynamic;

/// Comparison and function operators accepted by conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
    BeginsWith,
    Contains,
    Exists,
    NotExists,
}

impl Operator {
    fn symbol(&self) -> Result<&'static str> {
        match self {
            Operator::Eq => Ok("="),
            Operator::Ne => Ok("<>"),
            Operator::Lt => Ok("<"),
            Operator::Le => Ok("<="),
            Operator::Gt => Ok(">"),
            Operator::Ge => Ok(">="),
            other => Err(Error::InvalidOperator(format!(
                "{other:?} is not a comparison operator"
            ))),
        }
    }

    /// Operators valid in a sort-key (range) condition.
    pub fn valid_for_sort_key(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Lt
                | Operator::Le
                | Operator::Gt
                | Operator::Ge
                | Operator::Between
                | Operator::BeginsWith
        )
    }

    fn operand_count(&self) -> usize {
        match self {
            Operator::Between => 2,
            Operator::Exists | Operator::NotExists => 0,
            _ => 1,
        }
    }
}

/// Compiled expression components ready to attach to a request.
#[derive(Debug, Clone, Default)]
pub struct ExprComponents {
    pub key_condition_expression: Option<String>,
    pub filter_expression: Option<String>,
    pub condition_expression: Option<String>,
    pub update_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

/// Accumulates conditions and update actions, generating placeholders.
#[derive(Debug, Default)]
pub struct ExprBuilder {
    key_conditions: Vec<String>,
    filters: Vec<String>,
    conditions: Vec<String>,
    set_actions: Vec<String>,
    add_actions: Vec<String>,
    remove_actions: Vec<String>,
    delete_actions: Vec<String>,
    projections: Vec<String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    name_counter: usize,
    value_counter: usize,
}

impl ExprBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition-key condition. Only equality is valid here.
    pub fn key_partition_eq(&mut self, attribute: &str, value: &Value) -> Result<()> {
        let expr = self.compile_condition(attribute, Operator::Eq, std::slice::from_ref(value))?;
        self.key_conditions.push(expr);
        Ok(())
    }

    /// Sort-key condition; restricted to the range-condition operator set.
    pub fn key_sort_condition(
        &mut self,
        attribute: &str,
        operator: Operator,
        operands: &[Value],
    ) -> Result<()> {
        if !operator.valid_for_sort_key() {
            return Err(Error::InvalidOperator(format!(
                "{operator:?} is not valid for a sort-key condition"
            )));
        }
        let expr = self.compile_condition(attribute, operator, operands)?;
        self.key_conditions.push(expr);
        Ok(())
    }

    /// Filter condition; filters combine with AND.
    pub fn filter(&mut self, attribute: &str, operator: Operator, operands: &[Value]) -> Result<()> {
        let expr = self.compile_condition(attribute, operator, operands)?;
        self.filters.push(expr);
        Ok(())
    }

    /// Condition-expression clause for conditional writes.
    pub fn condition(
        &mut self,
        attribute: &str,
        operator: Operator,
        operands: &[Value],
    ) -> Result<()> {
        let expr = self.compile_condition(attribute, operator, operands)?;
        self.conditions.push(expr);
        Ok(())
    }

    pub fn update_set(&mut self, attribute: &str, value: &Value) -> Result<()> {
        let name = self.placeholder_name(attribute);
        let val = self.placeholder_value(value)?;
        self.set_actions.push(format!("{name} = {val}"));
        Ok(())
    }

    /// `SET attr = if_not_exists(attr, :default)`.
    pub fn update_set_if_not_exists(&mut self, attribute: &str, default: &Value) -> Result<()> {
        let name = self.placeholder_name(attribute);
        let val = self.placeholder_value(default)?;
        self.set_actions
            .push(format!("{name} = if_not_exists({name}, {val})"));
        Ok(())
    }

    /// `SET attr = list_append(attr, :value)`.
    pub fn update_list_append(&mut self, attribute: &str, value: &Value) -> Result<()> {
        let name = self.placeholder_name(attribute);
        let val = self.placeholder_value(value)?;
        self.set_actions
            .push(format!("{name} = list_append({name}, {val})"));
        Ok(())
    }

    /// `ADD attr :value` for numeric increment or set union.
    pub fn update_add(&mut self, attribute: &str, value: &Value) -> Result<()> {
        let name = self.placeholder_name(attribute);
        let val = self.placeholder_value(value)?;
        self.add_actions.push(format!("{name} {val}"));
        Ok(())
    }

    pub fn update_remove(&mut self, attribute: &str) {
        let name = self.placeholder_name(attribute);
        self.remove_actions.push(name);
    }

    /// `DELETE attr :subset` removes members from a set.
    pub fn update_delete(&mut self, attribute: &str, subset: &Value) -> Result<()> {
        if !matches!(
            subset,
            Value::StringSet(_) | Value::NumberSet(_) | Value::BinarySet(_)
        ) {
            return Err(Error::InvalidOperator(
                "DELETE update requires a set operand".to_string(),
            ));
        }
        let name = self.placeholder_name(attribute);
        let val = self.placeholder_value(subset)?;
        self.delete_actions.push(format!("{name} {val}"));
        Ok(())
    }

    pub fn project(&mut self, attributes: &[String]) {
        for attribute in attributes {
            let name = self.placeholder_name(attribute);
            self.projections.push(name);
        }
    }

    pub fn build(self) -> ExprComponents {
        let join = |parts: Vec<String>| -> Option<String> {
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" AND "))
            }
        };

        let mut update_parts = Vec::new();
        if !self.set_actions.is_empty() {
            update_parts.push(format!("SET {}", self.set_actions.join(", ")));
        }
        if !self.add_actions.is_empty() {
            update_parts.push(format!("ADD {}", self.add_actions.join(", ")));
        }
        if !self.remove_actions.is_empty() {
            update_parts.push(format!("REMOVE {}", self.remove_actions.join(", ")));
        }
        if !self.delete_actions.is_empty() {
            update_parts.push(format!("DELETE {}", self.delete_actions.join(", ")));
        }

        ExprComponents {
            key_condition_expression: join(self.key_conditions),
            filter_expression: join(self.filters),
            condition_expression: join(self.conditions),
            update_expression: if update_parts.is_empty() {
                None
            } else {
                Some(update_parts.join(" "))
            },
            projection_expression: if self.projections.is_empty() {
                None
            } else {
                Some(self.projections.join(", "))
            },
            names: self.names,
            values: self.values,
        }
    }

    fn compile_condition(
        &mut self,
        attribute: &str,
        operator: Operator,
        operands: &[Value],
    ) -> Result<String> {
        if operands.len() != operator.operand_count() {
            return Err(Error::InvalidOperator(format!(
                "{operator:?} takes {} operand(s), got {}",
                operator.operand_count(),
                operands.len()
            )));
        }

        let name = self.placeholder_name(attribute);
        match operator {
            Operator::Between => {
                let low = self.placeholder_value(&operands[0])?;
                let high = self.placeholder_value(&operands[1])?;
                Ok(format!("{name} BETWEEN {low} AND {high}"))
            }
            Operator::BeginsWith => {
                let val = self.placeholder_value(&operands[0])?;
                Ok(format!("begins_with({name}, {val})"))
            }
            Operator::Contains => {
                let val = self.placeholder_value(&operands[0])?;
                Ok(format!("contains({name}, {val})"))
            }
            Operator::Exists => Ok(format!("attribute_exists({name})")),
            Operator::NotExists => Ok(format!("attribute_not_exists({name})")),
            _ => {
                let symbol = operator.symbol()?;
                let val = self.placeholder_value(&operands[0])?;
                Ok(format!("{name} {symbol} {val}"))
            }
        }
    }

    fn placeholder_name(&mut self, attribute: &str) -> String {
        // Reuse the placeholder when the same attribute appears again.
        if let Some((placeholder, _)) = self.names.iter().find(|(_, n)| n.as_str() == attribute) {
            return placeholder.clone();
        }
        self.name_counter += 1;
        let placeholder = format!("#n{}", self.name_counter);
        self.names.insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    fn placeholder_value(&mut self, value: &Value) -> Result<String> {
        self.value_counter += 1;
        let placeholder = format!(":v{}", self.value_counter);
        self.values.insert(placeholder.clone(), encode_dynamic(value)?);
        Ok(placeholder)
    }
}
