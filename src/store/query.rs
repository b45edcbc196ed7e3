//! Parameterized query templates and typed row mapping.
//!
//! Backends that speak a query language keep their statements as static
//! [`QueryTemplate`]s with positional placeholders. Identifiers only ever
//! travel as bound [`QueryParam`]s and are never spliced into query text.
//!
//! Result rows are turned into [`Variable`]s by a [`RowMapper`], which is
//! generic over the row type so the same resolver works with any backend's
//! row shape.

use serde::Serialize;

use crate::types::{Variable, VariableId};

/// A statement with a fixed number of positional parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTemplate {
    name: &'static str,
    text: &'static str,
    arity: usize,
}

impl QueryTemplate {
    /// Declare a template.
    pub const fn new(name: &'static str, text: &'static str, arity: usize) -> Self {
        Self { name, text, arity }
    }

    /// Template name, used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Query text with placeholders.
    pub fn text(&self) -> &'static str {
        self.text
    }

    /// Number of parameters the template expects.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Bind parameters in placeholder order.
    pub fn bind(&self, params: Vec<QueryParam>) -> Result<BoundQuery, QueryError> {
        if params.len() != self.arity {
            return Err(QueryError::ArityMismatch {
                template: self.name,
                expected: self.arity,
                actual: params.len(),
            });
        }
        Ok(BoundQuery { template: *self, params })
    }
}

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// Scalar text.
    Text(String),
    /// Text array (e.g. a set of variable ids).
    TextList(Vec<String>),
    /// Integer.
    Integer(i64),
}

impl QueryParam {
    /// Bind a list of variable identifiers.
    pub fn ids(ids: &[VariableId]) -> Self {
        Self::TextList(ids.iter().map(|id| id.as_str().to_string()).collect())
    }
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

/// A template together with its parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    template: QueryTemplate,
    params: Vec<QueryParam>,
}

impl BoundQuery {
    /// The template being executed.
    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Query text.
    pub fn text(&self) -> &'static str {
        self.template.text
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }
}

/// Errors building a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Wrong number of parameters for a template.
    #[error("Query {template} expects {expected} parameters, got {actual}")]
    ArityMismatch {
        /// Template name.
        template: &'static str,
        /// Declared arity.
        expected: usize,
        /// Supplied count.
        actual: usize,
    },
    /// A result row is missing a required column.
    #[error("Result row has no usable column {0}")]
    MissingColumn(String),
}

/// Typed callback turning one result row into a [`Variable`].
pub trait RowMapper<Row>: Send + Sync {
    /// Error raised for a malformed row.
    type Error;

    /// Map one row.
    fn map_row(&self, row: &Row) -> Result<Variable, Self::Error>;

    /// Map every row, failing on the first malformed one.
    fn map_rows(&self, rows: &[Row]) -> Result<Vec<Variable>, Self::Error> {
        rows.iter().map(|row| self.map_row(row)).collect()
    }
}

impl<Row, E, F> RowMapper<Row> for F
where
    F: Fn(&Row) -> Result<Variable, E> + Send + Sync,
{
    type Error = E;

    fn map_row(&self, row: &Row) -> Result<Variable, E> {
        self(row)
    }
}

/// Maps rows by column name.
///
/// Implemented for JSON object rows and, with the `postgres` feature, for
/// database rows. A missing or null data type column maps to an empty tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRowMapper {
    /// Column holding the variable id.
    pub id_column: String,
    /// Column holding the variable name.
    pub name_column: String,
    /// Column holding the data type.
    pub data_type_column: String,
}

impl ColumnRowMapper {
    /// Mapper with custom column names.
    pub fn new(
        id_column: impl Into<String>,
        name_column: impl Into<String>,
        data_type_column: impl Into<String>,
    ) -> Self {
        Self {
            id_column: id_column.into(),
            name_column: name_column.into(),
            data_type_column: data_type_column.into(),
        }
    }
}

impl Default for ColumnRowMapper {
    fn default() -> Self {
        Self::new("variable_id", "name", "data_type")
    }
}

impl RowMapper<serde_json::Value> for ColumnRowMapper {
    type Error = QueryError;

    fn map_row(&self, row: &serde_json::Value) -> Result<Variable, QueryError> {
        let text = |column: &str| row.get(column).and_then(|v| v.as_str());

        let id = text(&self.id_column).ok_or_else(|| QueryError::MissingColumn(self.id_column.clone()))?;
        let name = text(&self.name_column).ok_or_else(|| QueryError::MissingColumn(self.name_column.clone()))?;
        let data_type = text(&self.data_type_column).unwrap_or_default();

        Ok(Variable::new(id, name, data_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TWO_PARAMS: QueryTemplate = QueryTemplate::new("two", "SELECT $1, $2", 2);

    #[test]
    fn test_bind_checks_arity() {
        assert!(TWO_PARAMS.bind(vec!["a".into(), 1i64.into()]).is_ok());

        let err = TWO_PARAMS.bind(vec!["a".into()]).unwrap_err();
        assert_eq!(
            err,
            QueryError::ArityMismatch { template: "two", expected: 2, actual: 1 }
        );
    }

    #[test]
    fn test_identifiers_stay_out_of_query_text() {
        let hostile = VariableId::new("x'); DROP TABLE catalog_variables; --");
        let bound = TWO_PARAMS
            .bind(vec!["ds".into(), QueryParam::ids(&[hostile.clone()])])
            .unwrap();

        assert_eq!(bound.text(), "SELECT $1, $2");
        assert_eq!(bound.params()[1], QueryParam::TextList(vec![hostile.to_string()]));
    }

    #[test]
    fn test_column_mapper_on_json_rows() {
        let mapper = ColumnRowMapper::default();
        let rows = vec![
            json!({"variable_id": "t", "name": "/time", "data_type": "double"}),
            json!({"variable_id": "lat", "name": "/lat", "data_type": null}),
        ];

        let vars = mapper.map_rows(&rows).unwrap();
        assert_eq!(vars[0], Variable::new("t", "/time", "double"));
        assert_eq!(vars[1].data_type, "");
    }

    #[test]
    fn test_column_mapper_custom_shape() {
        let mapper = ColumnRowMapper::new("uid", "path", "type");
        let row = json!({"uid": "V1", "path": "/grid/x", "type": "float"});
        assert_eq!(mapper.map_row(&row).unwrap().name, "/grid/x");

        let missing = json!({"path": "/grid/x"});
        assert_eq!(
            mapper.map_row(&missing).unwrap_err(),
            QueryError::MissingColumn("uid".to_string())
        );
    }

    #[test]
    fn test_closure_as_row_mapper() {
        let mapper = |row: &(String, String)| -> Result<Variable, QueryError> {
            Ok(Variable::new(row.0.clone(), row.1.clone(), ""))
        };
        let rows = vec![("a".to_string(), "/a".to_string())];
        assert_eq!(mapper.map_rows(&rows).unwrap()[0].id.as_str(), "a");
    }
}
