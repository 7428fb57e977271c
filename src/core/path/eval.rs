//! Path expression evaluation over JSON trees
//!
//! Evaluation is total: missing keys, wrong shapes and out-of-range indexes all
//! produce an empty collection. Leaf values are returned unconverted.

use super::parser::{CompareOp, Predicate, Step};
use serde_json::Value;
use std::borrow::Cow;

/// FHIR type suffixes probed for `name[x]`, in order
pub const CHOICE_SUFFIXES: [&str; 19] = [
    "Quantity",
    "CodeableConcept",
    "String",
    "Boolean",
    "Integer",
    "Decimal",
    "DateTime",
    "Date",
    "Time",
    "Instant",
    "Period",
    "Range",
    "Ratio",
    "Reference",
    "Coding",
    "Identifier",
    "Uri",
    "Attachment",
    "SampledData",
];

type Collection<'a> = Vec<Cow<'a, Value>>;

/// Evaluate steps against a root value
pub fn evaluate_steps<'a>(root: &'a Value, steps: &[Step]) -> Collection<'a> {
    let mut current: Collection<'a> = Vec::new();
    push_flattened(&mut current, Cow::Borrowed(root));

    for step in steps {
        current = apply(current, step);
    }
    current
}

fn apply<'a>(input: Collection<'a>, step: &Step) -> Collection<'a> {
    match step {
        Step::Field(name) => {
            let mut out = Vec::new();
            for item in input {
                if let Some(child) = child_of(item, name) {
                    push_flattened(&mut out, child);
                }
            }
            out
        }
        Step::Choice(name) => {
            let mut out = Vec::new();
            for item in input {
                if let Some(child) = choice_of(item, name) {
                    push_flattened(&mut out, child);
                }
            }
            out
        }
        Step::Index(i) => input.into_iter().nth(*i).into_iter().collect(),
        Step::Flatten => {
            let mut out = Vec::new();
            for item in input {
                push_flattened(&mut out, item);
            }
            out
        }
        Step::First => input.into_iter().next().into_iter().collect(),
        Step::Last => input.into_iter().last().into_iter().collect(),
        Step::Exists => vec![Cow::Owned(Value::Bool(!input.is_empty()))],
        Step::Empty => vec![Cow::Owned(Value::Bool(input.is_empty()))],
        Step::Count => vec![Cow::Owned(Value::from(input.len()))],
        Step::Where(predicate) => input
            .into_iter()
            .filter(|item| matches(item.as_ref(), predicate))
            .collect(),
    }
}

fn child_of<'a>(item: Cow<'a, Value>, name: &str) -> Option<Cow<'a, Value>> {
    match item {
        Cow::Borrowed(value) => value.get(name).map(Cow::Borrowed),
        Cow::Owned(value) => value.get(name).cloned().map(Cow::Owned),
    }
}

fn choice_of<'a>(item: Cow<'a, Value>, name: &str) -> Option<Cow<'a, Value>> {
    let obj = item.as_object()?;
    let key = CHOICE_SUFFIXES
        .iter()
        .map(|suffix| format!("{name}{suffix}"))
        .find(|key| obj.get(key).is_some_and(|v| !v.is_null()))?;
    child_of(item, &key)
}

/// Push a value, splicing in list elements and dropping nulls
fn push_flattened<'a>(out: &mut Collection<'a>, value: Cow<'a, Value>) {
    match value {
        Cow::Borrowed(Value::Array(items)) => {
            for item in items {
                push_flattened(out, Cow::Borrowed(item));
            }
        }
        Cow::Owned(Value::Array(items)) => {
            for item in items {
                push_flattened(out, Cow::Owned(item));
            }
        }
        Cow::Borrowed(Value::Null) | Cow::Owned(Value::Null) => {}
        other => out.push(other),
    }
}

fn matches(item: &Value, predicate: &Predicate) -> bool {
    let values = evaluate_steps(item, &predicate.path);
    let any_equal = values.iter().any(|v| literal_eq(v, &predicate.value));
    match predicate.op {
        CompareOp::Eq => any_equal,
        CompareOp::Ne => !values.is_empty() && !any_equal,
    }
}

fn literal_eq(value: &Value, literal: &Value) -> bool {
    match (value, literal) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (a, b) => a == b,
    }
}
