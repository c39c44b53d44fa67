use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::deep::ArgTree;
use crate::managed::Managed;

use super::Error;

/// Arguments of one call: positional and keyword trees, and an optional
/// placeholder that receives the function's return value.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSet<T> {
    pub ret: Option<T>,
    pub args: Vec<ArgTree<T>>,
    pub kwargs: BTreeMap<String, ArgTree<T>>,
}

impl<T> Default for CallSet<T> {
    fn default() -> Self {
        Self {
            ret: None,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }
}

impl CallSet<Managed> {
    /// Fails with `InvalidArgument` unless `ret` is a placeholder that can receive a value.
    pub fn new(
        ret: Option<ArgTree<Managed>>,
        args: Vec<ArgTree<Managed>>,
        kwargs: BTreeMap<String, ArgTree<Managed>>,
    ) -> Result<Self> {
        let ret = match ret {
            None => None,
            Some(ArgTree::Leaf(managed)) if managed.accepts_return() => Some(managed),
            Some(ArgTree::Leaf(managed)) => {
                return Err(Error::InvalidArgument(format!(
                    "return value cannot be bound to {:?} placeholder \"{}\"",
                    managed.kind, managed.name
                ))
                .into())
            }
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "return binding must be a managed placeholder, got {other:?}"
                ))
                .into())
            }
        };
        Ok(Self { ret, args, kwargs })
    }

    /// Positional arguments only, no return binding.
    pub fn args<I: IntoIterator<Item = ArgTree<Managed>>>(args: I) -> Self {
        Self {
            args: args.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn kwarg<T: Into<ArgTree<Managed>>>(mut self, key: &str, arg: T) -> Self {
        self.kwargs.insert(key.to_owned(), arg.into());
        self
    }

    pub fn returns(self, ret: Managed) -> Result<Self> {
        Self::new(Some(ArgTree::Leaf(ret)), self.args, self.kwargs)
    }
}

impl<T> CallSet<T> {
    /// Replace every placeholder, including the return binding.
    pub fn transform<U, F>(&self, f: &mut F) -> Result<CallSet<U>>
    where
        F: FnMut(&T) -> Result<U>,
    {
        let ret = match &self.ret {
            Some(ret) => Some(f(ret)?),
            None => None,
        };
        let args = self
            .args
            .iter()
            .map(|arg| arg.transform(f))
            .collect::<Result<_>>()?;
        let kwargs = self
            .kwargs
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.transform(f)?)))
            .collect::<Result<_>>()?;
        Ok(CallSet { ret, args, kwargs })
    }

    /// Resolve positional and keyword arguments into plain values.
    pub fn resolve<F>(&self, f: &mut F) -> Result<CallArgs>
    where
        F: FnMut(&T) -> Result<Value>,
    {
        let mut resolved = CallArgs::default();
        for arg in &self.args {
            resolved.args.push(arg.resolve(f)?.0);
        }
        for (k, v) in &self.kwargs {
            resolved.kwargs.insert(k.clone(), v.resolve(f)?.0);
        }
        Ok(resolved)
    }
}

/// Resolved arguments, as handed to a job function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn arg(&self, idx: usize) -> Result<&Value> {
        self.args
            .get(idx)
            .ok_or_else(|| anyhow!("missing positional argument {idx}"))
    }

    pub fn kwarg(&self, key: &str) -> Result<&Value> {
        self.kwargs
            .get(key)
            .ok_or_else(|| anyhow!("missing keyword argument {key}"))
    }

    pub fn arg_str(&self, idx: usize) -> Result<&str> {
        self.arg(idx)?
            .as_str()
            .ok_or_else(|| anyhow!("positional argument {idx} is not a string"))
    }

    pub fn kwarg_str(&self, key: &str) -> Result<&str> {
        self.kwarg(key)?
            .as_str()
            .ok_or_else(|| anyhow!("keyword argument {key} is not a string"))
    }

    /// Render as `name(a, b, key=c)`.
    pub fn display_command(&self, name: &str) -> String {
        let mut parts: Vec<String> = self.args.iter().map(Value::to_string).collect();
        parts.extend(self.kwargs.iter().map(|(k, v)| format!("{k}={v}")));
        format!("{name}({})", parts.join(", "))
    }
}
