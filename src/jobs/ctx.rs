use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use syntax::{Interval, TimeUnit};

const FACTOR_SUFFIX: &str = "_retry_factor";
const INCREMENT_SUFFIX: &str = "_retry_increment";

/// Outcome of asking a job to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// No retries left.
    Exhausted,
    /// Retrying; the context has no escalation rules.
    Unchanged,
    /// Retrying after applying the context's escalation rules.
    Escalated,
}

/// Execution context options: scheduling hints for the queue, retry limits,
/// and escalation rules applied on each retry.
///
/// `<opt>_retry_factor` multiplies `<opt>` on each retry and
/// `<opt>_retry_increment` adds to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCtx(BTreeMap<String, Value>);

impl JobCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert<T: Into<Value>>(&mut self, key: &str, value: T) {
        self.0.insert(key.to_owned(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Memory hint, in the units the queue expects.
    pub fn mem(&self) -> Option<f64> {
        self.get("mem").and_then(Value::as_f64)
    }

    pub fn ncpus(&self) -> Option<u64> {
        self.get("ncpus").and_then(Value::as_u64)
    }

    pub fn num_retry(&self) -> u64 {
        self.get("num_retry").and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn pool_id(&self) -> Option<&str> {
        self.get("pool_id").and_then(Value::as_str)
    }

    /// Wall-clock limit, written as an interval string or a number of seconds.
    pub fn timeout(&self) -> Result<Option<Interval>> {
        match self.get("timeout") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(Interval::parse(s)?)),
            Some(Value::Number(n)) => {
                let count = n
                    .as_u64()
                    .ok_or_else(|| anyhow!("timeout must be a whole number of seconds: {n}"))?;
                Ok(Some(Interval {
                    count,
                    unit: TimeUnit::Seconds,
                }))
            }
            Some(other) => Err(anyhow!("invalid timeout {other}")),
        }
    }

    /// Apply every escalation rule once. Returns true if the context has any
    /// escalation rule, whether or not an option's value moved.
    pub fn escalate(&mut self) -> Result<bool> {
        let mut rules = Vec::new();
        for (key, value) in &self.0 {
            if let Some(opt) = key.strip_suffix(FACTOR_SUFFIX) {
                rules.push((opt.to_owned(), Op::Mul, value.clone()));
            } else if let Some(opt) = key.strip_suffix(INCREMENT_SUFFIX) {
                rules.push((opt.to_owned(), Op::Add, value.clone()));
            }
        }

        let has_rules = !rules.is_empty();
        for (opt, op, by) in rules {
            let Some(current) = self.0.get(&opt) else {
                log::debug!("no option {opt} to escalate");
                continue;
            };
            let escalated = op.apply(current, &by).map_err(|e| e.context(format!("escalating {opt}")))?;
            self.0.insert(opt, escalated);
        }
        Ok(has_rules)
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Mul,
    Add,
}

impl Op {
    fn apply(self, current: &Value, by: &Value) -> Result<Value> {
        match (current, by) {
            (Value::Number(a), Value::Number(b)) => self.apply_numbers(a, b),
            // intervals keep their unit, e.g. "30m" * 2 = "60m".
            (Value::String(s), Value::Number(b)) => {
                let interval = Interval::parse(s)?;
                let scaled = self.apply_numbers(&Number::from(interval.count), b)?;
                let count = scaled
                    .as_f64()
                    .map(|f| f.round() as u64)
                    .ok_or_else(|| anyhow!("cannot scale interval {s} by {b}"))?;
                Ok(Value::String(
                    Interval {
                        count,
                        unit: interval.unit,
                    }
                    .to_string(),
                ))
            }
            (Value::String(s), Value::String(t)) if matches!(self, Self::Add) => {
                let a = Interval::parse(s)?.as_secs();
                let b = Interval::parse(t)?.as_secs();
                let total = a
                    .zip(b)
                    .and_then(|(a, b)| a.checked_add(b))
                    .ok_or_else(|| anyhow!("interval overflow adding {t} to {s}"))?;
                Ok(Value::String(format!("{total}s")))
            }
            _ => Err(anyhow!("cannot escalate {current} by {by}")),
        }
    }

    fn apply_numbers(self, a: &Number, b: &Number) -> Result<Value> {
        if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
            let result = match self {
                Self::Mul => a.checked_mul(b),
                Self::Add => a.checked_add(b),
            };
            return result
                .map(Value::from)
                .ok_or_else(|| anyhow!("integer overflow escalating {a} by {b}"));
        }
        let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
        let result = match self {
            Self::Mul => a * b,
            Self::Add => a + b,
        };
        Number::from_f64(result)
            .map(Value::Number)
            .ok_or_else(|| anyhow!("escalated value {result} is not finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() -> Result<()> {
        let ctx = JobCtx::new()
            .with("mem", 4)
            .with("ncpus", 2)
            .with("pool_id", "highmem")
            .with("timeout", "2h");
        assert_eq!(ctx.mem(), Some(4.0));
        assert_eq!(ctx.ncpus(), Some(2));
        assert_eq!(ctx.pool_id(), Some("highmem"));
        assert_eq!(ctx.num_retry(), 0);
        assert_eq!(ctx.timeout()?.and_then(|t| t.as_secs()), Some(7200));

        let seconds = JobCtx::new().with("timeout", 90);
        assert_eq!(seconds.timeout()?.map(|t| t.to_string()), Some("90s".to_owned()));
        assert!(JobCtx::new().timeout()?.is_none());
        assert!(JobCtx::new().with("timeout", "5y").timeout().is_err());
        Ok(())
    }

    #[test]
    fn test_factor_keeps_integers() -> Result<()> {
        let mut ctx = JobCtx::new().with("mem", 1).with("mem_retry_factor", 2);
        assert!(ctx.escalate()?);
        assert_eq!(ctx.get("mem"), Some(&json!(2)));
        assert!(ctx.escalate()?);
        assert_eq!(ctx.get("mem"), Some(&json!(4)));
        Ok(())
    }

    #[test]
    fn test_increment_and_floats() -> Result<()> {
        let mut ctx = JobCtx::new()
            .with("mem", 1.5)
            .with("mem_retry_increment", 1)
            .with("ncpus", 2)
            .with("ncpus_retry_factor", 1.5);
        assert!(ctx.escalate()?);
        assert_eq!(ctx.mem(), Some(2.5));
        assert_eq!(ctx.get("ncpus"), Some(&json!(3.0)));
        Ok(())
    }

    #[test]
    fn test_interval_escalation() -> Result<()> {
        let mut ctx = JobCtx::new()
            .with("timeout", "30m")
            .with("timeout_retry_factor", 2);
        ctx.escalate()?;
        assert_eq!(ctx.get("timeout"), Some(&json!("60m")));

        let mut ctx = JobCtx::new()
            .with("timeout", "1m")
            .with("timeout_retry_increment", "30s");
        ctx.escalate()?;
        assert_eq!(ctx.get("timeout"), Some(&json!("90s")));
        Ok(())
    }

    #[test]
    fn test_no_rules_unchanged() -> Result<()> {
        let mut ctx = JobCtx::new().with("mem", 8);
        assert!(!ctx.escalate()?);
        assert_eq!(ctx.mem(), Some(8.0));
        Ok(())
    }

    // a rule counts as escalation even when it leaves the value where it was.
    #[test]
    fn test_rules_escalate_without_moving() -> Result<()> {
        let mut ctx = JobCtx::new().with("mem", 8).with("mem_retry_factor", 1);
        assert!(ctx.escalate()?);
        assert_eq!(ctx.get("mem"), Some(&json!(8)));

        let mut ctx = JobCtx::new().with("mem_retry_factor", 2);
        assert!(ctx.escalate()?);
        assert!(ctx.get("mem").is_none());
        Ok(())
    }

    #[test]
    fn test_bad_factor_errors() {
        let mut ctx = JobCtx::new().with("mem", 8).with("mem_retry_factor", "double");
        let err = ctx.escalate().expect_err("factor is not a number");
        assert!(format!("{err:#}").contains("escalating mem"));
    }
}
