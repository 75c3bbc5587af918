//! Filter operations for PostgrestClient

/// Operator for filter expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to
    Eq,

    /// Not equal to
    Neq,

    /// Greater than
    Gt,

    /// Greater than or equal to
    Gte,

    /// Less than
    Lt,

    /// Less than or equal to
    Lte,

    /// Like (case sensitive)
    Like,

    /// Like (case insensitive)
    ILike,

    /// Is (`null`, `true`, `false`)
    Is,

    /// In a list of values
    In,
}

impl FilterOperator {
    /// Convert the operator to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
        }
    }

    /// Render `operator.value` as PostgREST expects it in the query string
    pub fn apply(&self, value: &str) -> String {
        match self {
            FilterOperator::In => format!("in.({})", value),
            _ => format!("{}.{}", self.as_str(), value),
        }
    }
}

/// Values accepted by the `is` operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsValue {
    Null,
    True,
    False,
}

impl IsValue {
    /// Convert the value to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IsValue::Null => "null",
            IsValue::True => "true",
            IsValue::False => "false",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        assert_eq!(FilterOperator::Eq.apply("u1"), "eq.u1");
        assert_eq!(FilterOperator::ILike.apply("%blackpink%"), "ilike.%blackpink%");
        assert_eq!(FilterOperator::In.apply("USER,ADMIN"), "in.(USER,ADMIN)");
        assert_eq!(FilterOperator::Is.apply(IsValue::Null.as_str()), "is.null");
    }
}
