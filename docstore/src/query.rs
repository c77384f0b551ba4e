use std::cmp::Ordering;

use crate::{Document, StoreError, Value};

/// Maximum number of values accepted by a single `In` filter.
pub const MAX_IN_VALUES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Field equals any element of the filter's array value.
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A query over a single collection. Filters are combined with AND.
///
/// # Examples
///
/// ```
/// use docstore::{Direction, FilterOp, Query};
///
/// let query = Query::collection("projects")
///     .filter("ownerId", FilterOp::Equal, "user-1")
///     .order_by("createdAt", Direction::Descending);
/// assert_eq!(query.filters.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rejects queries the store would refuse to run.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.collection.is_empty() {
            return Err(StoreError::InvalidQuery("collection name is empty".into()));
        }

        for filter in &self.filters {
            if filter.op != FilterOp::In {
                continue;
            }
            let values = filter.value.as_array().ok_or_else(|| {
                StoreError::InvalidQuery(format!("'in' filter on '{}' needs an array", filter.field))
            })?;
            if values.is_empty() {
                return Err(StoreError::InvalidQuery(format!(
                    "'in' filter on '{}' has no values",
                    filter.field
                )));
            }
            if values.len() > MAX_IN_VALUES {
                return Err(StoreError::InvalidQuery(format!(
                    "'in' filter on '{}' has {} values, at most {} allowed",
                    filter.field,
                    values.len(),
                    MAX_IN_VALUES
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(doc))
            && self.order_by.iter().all(|o| doc.get(&o.field).is_some())
    }

    /// Filters, orders and limits `docs` in memory.
    pub(crate) fn apply<'a>(&self, docs: impl Iterator<Item = &'a Document>) -> Vec<Document> {
        let mut results: Vec<Document> = docs.filter(|d| self.matches(d)).cloned().collect();

        results.sort_by(|a, b| {
            for order in &self.order_by {
                let ord = match (a.get(&order.field), b.get(&order.field)) {
                    (Some(x), Some(y)) => x.compare(y),
                    _ => Ordering::Equal,
                };
                let ord = match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id.cmp(&b.id)
        });

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }

        results
    }
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        let Some(field) = doc.get(&self.field) else {
            return false;
        };

        match self.op {
            FilterOp::Equal => field.compare(&self.value) == Ordering::Equal,
            FilterOp::NotEqual => field.compare(&self.value) != Ordering::Equal,
            FilterOp::LessThan => field.compare(&self.value) == Ordering::Less,
            FilterOp::LessThanOrEqual => field.compare(&self.value) != Ordering::Greater,
            FilterOp::GreaterThan => field.compare(&self.value) == Ordering::Greater,
            FilterOp::GreaterThanOrEqual => field.compare(&self.value) != Ordering::Less,
            FilterOp::In => self
                .value
                .as_array()
                .map(|values| values.iter().any(|v| field.compare(v) == Ordering::Equal))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fields;
    use time::macros::datetime;

    fn doc(id: &str, owner: &str, rank: i64) -> Document {
        let mut fields = Fields::new();
        fields.insert("owner".into(), Value::from(owner));
        fields.insert("rank".into(), Value::Integer(rank));
        Document {
            id: id.into(),
            fields,
            create_time: datetime!(2024-01-01 00:00 UTC),
            update_time: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn equality_and_ordering() {
        let docs = vec![doc("a", "u1", 1), doc("b", "u2", 5), doc("c", "u1", 3)];
        let query = Query::collection("items")
            .filter("owner", FilterOp::Equal, "u1")
            .order_by("rank", Direction::Descending);

        let ids: Vec<_> = query.apply(docs.iter()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn in_filter_matches_any_member() {
        let docs = vec![doc("a", "u1", 1), doc("b", "u2", 5), doc("c", "u3", 3)];
        let query = Query::collection("items").filter(
            "owner",
            FilterOp::In,
            vec!["u1", "u3"],
        );

        assert_eq!(query.apply(docs.iter()).len(), 2);
    }

    #[test]
    fn range_filters_and_limit() {
        let docs = vec![doc("a", "u1", 1), doc("b", "u1", 5), doc("c", "u1", 3)];
        let query = Query::collection("items")
            .filter("rank", FilterOp::GreaterThanOrEqual, 3i64)
            .order_by("rank", Direction::Ascending)
            .limit(1);

        let results = query.apply(docs.iter());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c");
    }

    #[test]
    fn missing_field_never_matches() {
        let docs = vec![doc("a", "u1", 1)];
        let query = Query::collection("items").filter("status", FilterOp::NotEqual, "active");
        assert!(query.apply(docs.iter()).is_empty());
    }

    #[test]
    fn empty_in_filter_is_rejected() {
        let query = Query::collection("items").filter("owner", FilterOp::In, Vec::<String>::new());
        assert!(matches!(query.validate(), Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn oversized_in_filter_is_rejected() {
        let ids: Vec<String> = (0..=MAX_IN_VALUES).map(|i| i.to_string()).collect();
        let query = Query::collection("items").filter("owner", FilterOp::In, ids);
        assert!(query.validate().is_err());
    }
}
