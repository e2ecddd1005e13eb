use crate::error::{Error, Result};
use crate::statement::{CompiledStatement, Segment};
use crate::value::{Params, Value};
use tracing::debug;

/// Bind values for prepared execution, one per placeholder occurrence.
///
/// Names the caller did not supply bind as [`crate::value::MISSING`]; keys
/// with no matching placeholder are ignored.
pub fn bind_positional(statement: &CompiledStatement, params: &Params) -> Vec<Value> {
    statement
        .placeholder_names()
        .iter()
        .map(|name| {
            if params.get(name).is_none() {
                debug!(placeholder = %name, "no argument supplied, binding NULL");
            }
            params.resolve(name).clone()
        })
        .collect()
}

/// Render the template with every placeholder replaced by an escaped literal.
pub fn bind_literal(statement: &CompiledStatement, params: &Params) -> Result<String> {
    let dialect = statement.dialect();
    let mut sql = String::with_capacity(statement.template().len());
    for segment in statement.segments() {
        match segment {
            Segment::Text(text) => sql.push_str(text),
            Segment::Placeholder(name) => {
                let literal = dialect
                    .render_literal(params.resolve(name))
                    .map_err(|source| Error::Bind {
                        name: name.clone(),
                        source,
                    })?;
                sql.push_str(&literal);
            }
        }
    }
    Ok(sql)
}
