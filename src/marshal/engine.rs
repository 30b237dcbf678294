//! The marshalling engine.
//!
//! Recursively projects a source object graph into an ordered JSON value
//! according to a [`Schema`], with depth limiting and cycle avoidance. The
//! engine performs no I/O and keeps no state beyond the per-call context, so
//! it can be invoked freely from concurrent workers.

use crate::error::{FloodgateError, Result};
use crate::marshal::fields::{Field, FieldKind, Schema, render_scalar};
use crate::marshal::source::{EntityRef, Resolved, identity};
use serde_json::Value;

/// Options for one top-level marshal call.
///
/// `only` and `exclude` filter fields of the top-level entity by name.
/// `depth` caps nested expansion: 0 means unlimited, and `depth = N` permits
/// one level of nesting beyond the first N (the first nested object under a
/// `depth = 1` call still renders its own nested fields once).
#[derive(Debug, Clone, Default)]
pub struct MarshalOptions {
    pub only: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub depth: u32,
}

impl MarshalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

/// Per-call marshalling state: the depth budget and the identities visited
/// along the current recursion path. Owned by one marshal invocation.
struct MarshalContext {
    /// Remaining nested-expansion levels; `None` is unlimited.
    remaining: Option<u32>,
    visited: Vec<usize>,
}

impl MarshalContext {
    fn new(depth: u32, root: usize) -> Self {
        Self {
            remaining: if depth == 0 { None } else { Some(depth + 1) },
            visited: vec![root],
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Marshal one source entity into an ordered JSON object.
pub fn marshal(source: &EntityRef, schema: &Schema, opts: &MarshalOptions) -> Result<Value> {
    let mut ctx = MarshalContext::new(opts.depth, identity(source));
    marshal_entity(source, schema, Some(opts), &mut ctx)
}

/// Marshal a sequence of entities independently, returning an ordered array.
///
/// Each element gets a fresh context; filters and depth apply to every
/// element as if it were a top-level call.
pub fn marshal_all(sources: &[EntityRef], schema: &Schema, opts: &MarshalOptions) -> Result<Value> {
    let items = sources
        .iter()
        .map(|source| marshal(source, schema, opts))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(items))
}

fn marshal_entity(
    entity: &EntityRef,
    schema: &Schema,
    filters: Option<&MarshalOptions>,
    ctx: &mut MarshalContext,
) -> Result<Value> {
    let mut out = serde_json::Map::new();

    for (name, field) in schema.iter() {
        // Lazy fields are excluded from default output; there is currently
        // no mechanism to request them explicitly.
        if field.lazy {
            continue;
        }

        if let Some(opts) = filters {
            if let Some(only) = &opts.only {
                if !only.iter().any(|n| n == name) {
                    continue;
                }
            }
            if let Some(exclude) = &opts.exclude {
                if exclude.iter().any(|n| n == name) {
                    continue;
                }
            }
        }

        // Depth budget spent: nested expansion for this field is omitted.
        if expands_entities(field) && ctx.exhausted() {
            continue;
        }

        let attr = field.attribute.as_deref().unwrap_or(name);
        let resolved = entity.get(attr);

        let value = render_field(name, field, resolved, ctx)?;
        out.insert(name.clone(), value);
    }

    Ok(Value::Object(out))
}

/// Whether rendering this field recurses into sub-entities.
fn expands_entities(field: &Field) -> bool {
    match &field.kind {
        FieldKind::Scalar(_) => false,
        FieldKind::Nested(_) | FieldKind::Relationship { .. } => true,
        FieldKind::List(element) => expands_entities(element),
    }
}

fn render_field(
    name: &str,
    field: &Field,
    resolved: Resolved,
    ctx: &mut MarshalContext,
) -> Result<Value> {
    match &field.kind {
        FieldKind::Scalar(_) => match resolved {
            Resolved::Absent => Ok(field.default.clone().unwrap_or(Value::Null)),
            Resolved::Value(raw) => render_scalar(name, field, &raw),
            Resolved::One(_) | Resolved::Many(_) => Err(FloodgateError::marshalling(
                name,
                Value::String("<sub-entity>".to_string()),
            )),
        },

        FieldKind::Nested(child_schema) => match resolved {
            Resolved::Absent => Ok(field.default.clone().unwrap_or(Value::Null)),
            Resolved::One(child) => marshal_child(&child, child_schema, ctx),
            Resolved::Many(children) => marshal_children(&children, child_schema, ctx),
            Resolved::Value(Value::Null) => Ok(Value::Null),
            Resolved::Value(other) => Err(FloodgateError::marshalling(name, other)),
        },

        FieldKind::Relationship {
            schema: child_schema,
            cardinality,
        } => {
            if cardinality.is_many() {
                match resolved {
                    Resolved::Absent => Ok(field
                        .default
                        .clone()
                        .unwrap_or_else(|| Value::Array(Vec::new()))),
                    Resolved::Many(children) => marshal_children(&children, child_schema, ctx),
                    // A lone sub-object under a to-many relationship
                    // marshals as a single-element collection.
                    Resolved::One(child) => Ok(Value::Array(vec![marshal_child(
                        &child,
                        child_schema,
                        ctx,
                    )?])),
                    Resolved::Value(Value::Array(items)) if items.is_empty() => {
                        Ok(Value::Array(Vec::new()))
                    }
                    Resolved::Value(other) => Err(FloodgateError::marshalling(name, other)),
                }
            } else {
                match resolved {
                    Resolved::Absent => Ok(field.default.clone().unwrap_or(Value::Null)),
                    Resolved::One(child) => marshal_child(&child, child_schema, ctx),
                    Resolved::Value(Value::Null) => Ok(Value::Null),
                    Resolved::Many(_) => Err(FloodgateError::marshalling(
                        name,
                        Value::String("<collection>".to_string()),
                    )),
                    Resolved::Value(other) => Err(FloodgateError::marshalling(name, other)),
                }
            }
        }

        FieldKind::List(element) => match resolved {
            Resolved::Absent => Ok(field
                .default
                .clone()
                .unwrap_or_else(|| Value::Array(Vec::new()))),
            Resolved::Many(children) => {
                let mut items = Vec::with_capacity(children.len());
                for child in &children {
                    items.push(render_field(name, element, Resolved::One(child.clone()), ctx)?);
                }
                Ok(Value::Array(items))
            }
            Resolved::Value(Value::Array(raw_items)) => {
                let mut items = Vec::with_capacity(raw_items.len());
                for raw in raw_items {
                    items.push(render_field(name, element, Resolved::Value(raw), ctx)?);
                }
                Ok(Value::Array(items))
            }
            Resolved::One(_) | Resolved::Value(_) => Err(FloodgateError::marshalling(
                name,
                Value::String("<non-iterable>".to_string()),
            )),
        },
    }
}

/// Recurse into one sub-entity, guarding against cycles and spending one
/// level of the depth budget.
fn marshal_child(child: &EntityRef, schema: &Schema, ctx: &mut MarshalContext) -> Result<Value> {
    let id = identity(child);
    // An identity already on the current path means a cycle; emit a minimal
    // placeholder instead of recursing forever.
    if ctx.visited.contains(&id) {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    ctx.visited.push(id);
    let saved = ctx.remaining;
    if let Some(remaining) = ctx.remaining.as_mut() {
        *remaining -= 1;
    }

    let result = marshal_entity(child, schema, None, ctx);

    ctx.remaining = saved;
    ctx.visited.pop();
    result
}

fn marshal_children(
    children: &[EntityRef],
    schema: &Schema,
    ctx: &mut MarshalContext,
) -> Result<Value> {
    let items = children
        .iter()
        .map(|child| marshal_child(child, schema, ctx))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(items))
}
