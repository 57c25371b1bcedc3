//! Sort specifications.

use crate::error::ValidationError;
use std::fmt;
use std::str::FromStr;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Applies the direction to an ascending ordering.
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }

    /// Name used in query documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Field path.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortField {
    /// Ascending sort on a field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on a field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parses the mango sort list `[{"name": "asc"}, {"age": "desc"}]`.
    ///
    /// A bare string `"name"` is shorthand for ascending.
    pub fn parse_list(json: &serde_json::Value) -> Result<Vec<Self>, ValidationError> {
        let items = json
            .as_array()
            .ok_or_else(|| ValidationError::invalid_query("sort must be an array"))?;

        let mut fields = Vec::with_capacity(items.len());
        for item in items {
            match item {
                serde_json::Value::String(field) => fields.push(Self::asc(field.clone())),
                serde_json::Value::Object(entry) if entry.len() == 1 => {
                    for (field, direction) in entry {
                        let text = direction.as_str().unwrap_or_default();
                        let direction = text.parse().map_err(|_| {
                            ValidationError::InvalidSortDirection {
                                field: field.clone(),
                                direction: text_or_json(direction),
                            }
                        })?;
                        fields.push(Self {
                            field: field.clone(),
                            direction,
                        });
                    }
                }
                other => {
                    return Err(ValidationError::invalid_query(format!(
                        "invalid sort entry {other}"
                    )))
                }
            }
        }
        Ok(fields)
    }
}

fn text_or_json(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}
