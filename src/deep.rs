use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;

use crate::managed::Managed;

/// Nested job arguments: plain values, lists and string-keyed maps,
/// with placeholders of type `T` anywhere in the structure.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgTree<T> {
    Leaf(T),
    Value(Value),
    List(Vec<ArgTree<T>>),
    Map(BTreeMap<String, ArgTree<T>>),
}

impl<T> ArgTree<T> {
    pub fn list<I: IntoIterator<Item = ArgTree<T>>>(items: I) -> Self {
        Self::List(items.into_iter().collect())
    }

    pub fn map<I, K>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, ArgTree<T>)>,
        K: Into<String>,
    {
        Self::Map(items.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Rebuild the tree with every leaf replaced by `f(leaf)`, failing on the first error.
    pub fn transform<U, F>(&self, f: &mut F) -> Result<ArgTree<U>>
    where
        F: FnMut(&T) -> Result<U>,
    {
        Ok(match self {
            Self::Leaf(leaf) => ArgTree::Leaf(f(leaf)?),
            Self::Value(value) => ArgTree::Value(value.clone()),
            Self::List(items) => ArgTree::List(
                items
                    .iter()
                    .map(|item| item.transform(f))
                    .collect::<Result<_>>()?,
            ),
            Self::Map(items) => ArgTree::Map(
                items
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.transform(f)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Collapse the tree into a plain value using `f` for each leaf.
    /// Also returns whether any leaf was replaced.
    pub fn resolve<F>(&self, f: &mut F) -> Result<(Value, bool)>
    where
        F: FnMut(&T) -> Result<Value>,
    {
        match self {
            Self::Leaf(leaf) => Ok((f(leaf)?, true)),
            Self::Value(value) => Ok((value.clone(), false)),
            Self::List(items) => {
                let mut replaced = false;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let (value, r) = item.resolve(f)?;
                    replaced |= r;
                    values.push(value);
                }
                Ok((Value::Array(values), replaced))
            }
            Self::Map(items) => {
                let mut replaced = false;
                let mut values = serde_json::Map::with_capacity(items.len());
                for (k, v) in items {
                    let (value, r) = v.resolve(f)?;
                    replaced |= r;
                    values.insert(k.clone(), value);
                }
                Ok((Value::Object(values), replaced))
            }
        }
    }
}

impl From<Managed> for ArgTree<Managed> {
    fn from(managed: Managed) -> Self {
        Self::Leaf(managed)
    }
}

impl From<Value> for ArgTree<Managed> {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}
