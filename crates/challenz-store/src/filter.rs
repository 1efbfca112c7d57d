use crate::StoreError;
use serde_json::Value;

/// Comparison applied by a single [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    /// Case-insensitive `LIKE`; `%` matches any run, `_` a single char.
    Ilike,
    Gte,
    Lte,
    /// Membership in a JSON array of values.
    In,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ilike => "ilike",
            Op::Gte => "gte",
            Op::Lte => "lte",
            Op::In => "in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    fn validate(&self) -> Result<(), StoreError> {
        check_identifier(&self.field)?;
        match (self.op, &self.value) {
            (Op::In, Value::Array(_)) => Ok(()),
            (Op::In, other) => Err(StoreError::InvalidFilter(format!(
                "'{}' in-filter needs an array, got {other}",
                self.field
            ))),
            (Op::Ilike, Value::String(_)) => Ok(()),
            (Op::Ilike, other) => Err(StoreError::InvalidFilter(format!(
                "'{}' ilike-filter needs a string pattern, got {other}",
                self.field
            ))),
            (Op::Gte | Op::Lte, Value::Null) => Err(StoreError::InvalidFilter(format!(
                "'{}' range filter cannot compare against null",
                self.field
            ))),
            _ => Ok(()),
        }
    }
}

/// One term of a filter conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Where(Condition),
    /// Matches when any of the conditions holds.
    Or(Vec<Condition>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Where(Condition::new(field, Op::Eq, value))
    }

    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Where(Condition::new(field, Op::Ilike, Value::String(pattern.into())))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Where(Condition::new(field, Op::Gte, value))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Where(Condition::new(field, Op::Lte, value))
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::Where(Condition::new(field, Op::In, Value::Array(values)))
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Filter::Or(conditions)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Filter::Where(c) => c.validate(),
            Filter::Or(cs) if cs.is_empty() => {
                Err(StoreError::InvalidFilter("empty or-filter".into()))
            }
            Filter::Or(cs) => cs.iter().try_for_each(Condition::validate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Rows `[offset, offset + limit - 1]` of the ordered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub limit: u32,
}

impl Range {
    pub fn new(offset: u64, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// Inclusive index of the last row in the range.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.limit.max(1)) - 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Fields(Vec<String>),
}

impl Projection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Fields(fields.into_iter().map(Into::into).collect())
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Projection::All => Ok(()),
            Projection::Fields(fields) if fields.is_empty() => {
                Err(StoreError::InvalidFilter("empty projection".into()))
            }
            Projection::Fields(fields) => fields.iter().try_for_each(|f| check_identifier(f)),
        }
    }
}

/// Everything a `query` call needs besides the collection name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub range: Option<Range>,
    pub projection: Projection,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.filters.iter().try_for_each(Filter::validate)?;
        self.order.iter().try_for_each(|o| check_identifier(&o.field))?;
        self.projection.validate()
    }
}

/// Collection and field names end up in SQL text and URLs, so only plain
/// identifiers are accepted.
pub fn check_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_head && valid_tail && name.len() <= 63 {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

pub fn validate_filters(filters: &[Filter]) -> Result<(), StoreError> {
    filters.iter().try_for_each(Filter::validate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_reject_injection() {
        assert!(check_identifier("created_at").is_ok());
        assert!(check_identifier("_private1").is_ok());
        assert!(check_identifier("1abc").is_err());
        assert!(check_identifier("name; DROP TABLE users").is_err());
        assert!(check_identifier("a.b").is_err());
        assert!(check_identifier("").is_err());
    }

    #[test]
    fn in_filter_requires_array() {
        assert!(Filter::is_in("id", vec![json!(1)]).validate().is_ok());
        let bad = Filter::Where(Condition::new("id", Op::In, json!(1)));
        assert!(matches!(bad.validate(), Err(StoreError::InvalidFilter(_))));
    }

    #[test]
    fn empty_or_is_rejected() {
        assert!(Filter::or(vec![]).validate().is_err());
    }

    #[test]
    fn range_end_is_inclusive() {
        assert_eq!(Range::new(20, 10).end(), 29);
        assert_eq!(Range::new(0, 1).end(), 0);
    }

    #[test]
    fn select_validates_order_and_projection() {
        let select = Select::new()
            .order(Order::desc("created at"))
            .projection(Projection::fields(["id"]));
        assert!(matches!(select.validate(), Err(StoreError::InvalidIdentifier(_))));
    }
}
