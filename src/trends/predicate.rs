//! Declarative rule predicates.
//!
//! Rules arrive as data (`all` / `any` / `not` trees over
//! `{feature, op, value}` clauses) and are compiled against the known
//! feature set before evaluation. Evaluation is three-valued: a clause on
//! a feature the game does not carry is unknown, and only a definite
//! `True` counts as a match.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GameFeatures, Role, Season, Venue, Weather};
use crate::types::{EngineError, Sport};

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    #[serde(untagged)]
    Clause(Clause),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub feature: String,
    pub op: Op,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl Op {
    fn is_ordering(&self) -> bool {
        matches!(self, Op::Gt | Op::Gte | Op::Lt | Op::Lte)
    }
}

impl Predicate {
    pub fn clause(feature: &str, op: Op, value: Value) -> Self {
        Predicate::Clause(Clause {
            feature: feature.to_string(),
            op,
            value,
        })
    }

    /// Validate against the feature set. Errors name `rule_id`.
    pub fn compile(&self, rule_id: &str) -> Result<CompiledPredicate, EngineError> {
        let invalid = |reason: String| EngineError::InvalidPredicate {
            rule_id: rule_id.to_string(),
            reason,
        };
        Ok(match self {
            Predicate::All(parts) => CompiledPredicate::All(
                parts.iter().map(|p| p.compile(rule_id)).collect::<Result<_, _>>()?,
            ),
            Predicate::Any(parts) => CompiledPredicate::Any(
                parts.iter().map(|p| p.compile(rule_id)).collect::<Result<_, _>>()?,
            ),
            Predicate::Not(inner) => CompiledPredicate::Not(Box::new(inner.compile(rule_id)?)),
            Predicate::Clause(clause) => {
                CompiledPredicate::Clause(compile_clause(clause).map_err(invalid)?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Sport,
    Venue,
    Role,
    RestDaysDiff,
    Divisional,
    Season,
    Weather,
}

impl Feature {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "sport" => Feature::Sport,
            "venue" | "side" => Feature::Venue,
            "role" => Feature::Role,
            "rest_days_diff" => Feature::RestDaysDiff,
            "divisional" => Feature::Divisional,
            "season" => Feature::Season,
            "weather" => Feature::Weather,
            _ => return None,
        })
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Feature::RestDaysDiff)
    }

    /// Parse a literal for this feature into its canonical form.
    fn literal(&self, value: &Value) -> Result<FeatureValue, String> {
        fn category<T: serde::de::DeserializeOwned + serde::Serialize>(
            value: &Value,
            name: &str,
        ) -> Result<FeatureValue, String> {
            let parsed: T = serde_json::from_value(value.clone())
                .map_err(|_| format!("{value} is not a valid {name}"))?;
            let canonical = serde_json::to_value(parsed).map_err(|e| e.to_string())?;
            match canonical {
                Value::String(s) => Ok(FeatureValue::Text(s)),
                other => Err(format!("{other} is not a valid {name}")),
            }
        }

        match self {
            Feature::Sport => category::<Sport>(value, "sport"),
            Feature::Venue => category::<Venue>(value, "venue"),
            Feature::Role => category::<Role>(value, "role"),
            Feature::Season => category::<Season>(value, "season"),
            Feature::Weather => category::<Weather>(value, "weather"),
            Feature::RestDaysDiff => value
                .as_i64()
                .map(FeatureValue::Int)
                .ok_or_else(|| format!("rest_days_diff needs an integer, got {value}")),
            Feature::Divisional => value
                .as_bool()
                .map(FeatureValue::Bool)
                .ok_or_else(|| format!("divisional needs a boolean, got {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

fn text<T: Serialize>(v: &T) -> Option<FeatureValue> {
    match serde_json::to_value(v) {
        Ok(Value::String(s)) => Some(FeatureValue::Text(s)),
        _ => None,
    }
}

impl GameFeatures {
    /// The value of one feature, or `None` when the game does not carry it.
    pub fn value_of(&self, feature: Feature) -> Option<FeatureValue> {
        match feature {
            Feature::Sport => text(&self.sport),
            Feature::Venue => text(&self.venue),
            Feature::Role => self.role.as_ref().and_then(text),
            Feature::Season => self.season.as_ref().and_then(text),
            Feature::Weather => self.weather.as_ref().and_then(text),
            Feature::RestDaysDiff => self.rest_days_diff.map(|d| FeatureValue::Int(d as i64)),
            Feature::Divisional => self.divisional.map(FeatureValue::Bool),
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClause {
    feature: Feature,
    test: ClauseTest,
}

#[derive(Debug, Clone, PartialEq)]
enum ClauseTest {
    Eq(FeatureValue),
    Ne(FeatureValue),
    Cmp(Op, i64),
    In(Vec<FeatureValue>),
}

fn compile_clause(clause: &Clause) -> Result<CompiledClause, String> {
    let feature = Feature::parse(&clause.feature)
        .ok_or_else(|| format!("unknown feature '{}'", clause.feature))?;

    let test = match clause.op {
        Op::Eq => ClauseTest::Eq(feature.literal(&clause.value)?),
        Op::Ne => ClauseTest::Ne(feature.literal(&clause.value)?),
        op if op.is_ordering() => {
            if !feature.is_numeric() {
                return Err(format!("{:?} needs a numeric feature, '{}' is not", op, clause.feature));
            }
            match feature.literal(&clause.value)? {
                FeatureValue::Int(n) => ClauseTest::Cmp(op, n),
                other => return Err(format!("{other:?} is not numeric")),
            }
        }
        _ => {
            let items = clause
                .value
                .as_array()
                .ok_or_else(|| format!("'in' needs a list, got {}", clause.value))?;
            if items.is_empty() {
                return Err("'in' list is empty".into());
            }
            ClauseTest::In(items.iter().map(|v| feature.literal(v)).collect::<Result<_, _>>()?)
        }
    };

    Ok(CompiledClause { feature, test })
}

/// Kleene truth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn from_bool(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    fn not(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledPredicate {
    All(Vec<CompiledPredicate>),
    Any(Vec<CompiledPredicate>),
    Not(Box<CompiledPredicate>),
    Clause(CompiledClause),
}

impl CompiledPredicate {
    pub fn evaluate(&self, game: &GameFeatures) -> Truth {
        match self {
            CompiledPredicate::All(parts) => {
                let mut acc = Truth::True;
                for p in parts {
                    match p.evaluate(game) {
                        Truth::False => return Truth::False,
                        Truth::Unknown => acc = Truth::Unknown,
                        Truth::True => {}
                    }
                }
                acc
            }
            CompiledPredicate::Any(parts) => {
                let mut acc = Truth::False;
                for p in parts {
                    match p.evaluate(game) {
                        Truth::True => return Truth::True,
                        Truth::Unknown => acc = Truth::Unknown,
                        Truth::False => {}
                    }
                }
                acc
            }
            CompiledPredicate::Not(inner) => inner.evaluate(game).not(),
            CompiledPredicate::Clause(c) => c.evaluate(game),
        }
    }

    pub fn matches(&self, game: &GameFeatures) -> bool {
        self.evaluate(game) == Truth::True
    }
}

impl CompiledClause {
    fn evaluate(&self, game: &GameFeatures) -> Truth {
        let Some(actual) = game.value_of(self.feature) else {
            return Truth::Unknown;
        };
        match &self.test {
            ClauseTest::Eq(v) => Truth::from_bool(&actual == v),
            ClauseTest::Ne(v) => Truth::from_bool(&actual != v),
            ClauseTest::In(vs) => Truth::from_bool(vs.contains(&actual)),
            ClauseTest::Cmp(op, n) => match actual {
                FeatureValue::Int(a) => Truth::from_bool(match op {
                    Op::Gt => a > *n,
                    Op::Gte => a >= *n,
                    Op::Lt => a < *n,
                    Op::Lte => a <= *n,
                    _ => false,
                }),
                _ => Truth::Unknown,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
