use rusqlite::types::Value;

/// Accumulates `AND` clauses and their bound values. Each `?` in a clause
/// is rewritten to the numbered placeholder of the value being bound, so a
/// clause may reference one value several times.
pub struct QueryBuilder {
    sql: String,
    args: Vec<Value>,
}

impl QueryBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            sql: base.into(),
            args: Vec::new(),
        }
    }

    pub fn and(&mut self, clause: &str, value: impl Into<Value>) -> &mut Self {
        self.args.push(value.into());
        let placeholder = format!("?{}", self.args.len());
        self.sql.push_str(" AND ");
        self.sql.push_str(&clause.replace('?', &placeholder));
        self
    }

    pub fn push(&mut self, tail: &str) -> &mut Self {
        self.sql.push(' ');
        self.sql.push_str(tail);
        self
    }

    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        self.args.push(value.into());
        format!("?{}", self.args.len())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_placeholders_in_order() {
        let mut q = QueryBuilder::new("SELECT id FROM events WHERE 1 = 1");
        q.and("status = ?", "published".to_string());
        q.and("(title = ? OR location = ?)", "x".to_string());
        let limit = q.bind(10i64);
        q.push(&format!("LIMIT {limit}"));

        assert_eq!(
            q.sql(),
            "SELECT id FROM events WHERE 1 = 1 AND status = ?1 AND (title = ?2 OR location = ?2) LIMIT ?3"
        );
        assert_eq!(q.args().len(), 3);
    }
}
