use sqlx::{Postgres, QueryBuilder};

/// Placeholder token used inside predicate clauses. Each occurrence turns
/// into one bound parameter when the set is pushed onto a query builder.
const PLACEHOLDER: &str = "$_";

/// An owned, bindable query parameter.
#[derive(Debug, Clone)]
pub enum Bind {
    Text(String),
    Int(i32),
    TextArray(Vec<String>),
    IntArray(Vec<i32>),
}

/// One independent WHERE predicate owning its own parameter bindings.
///
/// Predicates are written with `$_` placeholders and combined with AND by
/// [`PredicateSet`], so filter fragments never concatenate user values into
/// SQL and each fragment stays testable in isolation.
#[derive(Debug, Clone)]
pub struct Predicate {
    clause: String,
    binds: Vec<Bind>,
}

impl Predicate {
    /// Builds a predicate. The number of `$_` placeholders in `clause`
    /// must match `binds.len()`.
    pub fn new(clause: impl Into<String>, binds: Vec<Bind>) -> Self {
        let clause = clause.into();
        let placeholders = clause.matches(PLACEHOLDER).count();
        assert_eq!(
            placeholders,
            binds.len(),
            "predicate {:?} has {} placeholders but {} binds",
            clause,
            placeholders,
            binds.len()
        );
        Self { clause, binds }
    }
}

/// AND-combination of independent predicates.
#[derive(Debug, Clone, Default)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Appends ` WHERE a AND b AND ...` to the builder, binding every
    /// parameter in predicate order. Appends nothing when the set is
    /// empty.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        for (i, predicate) in self.predicates.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });

            let mut binds = predicate.binds.iter();
            let mut rest = predicate.clause.as_str();
            while let Some(pos) = rest.find(PLACEHOLDER) {
                builder.push(&rest[..pos]);
                match binds.next().expect("bind count checked in Predicate::new") {
                    Bind::Text(v) => builder.push_bind(v.clone()),
                    Bind::Int(v) => builder.push_bind(*v),
                    Bind::TextArray(v) => builder.push_bind(v.clone()),
                    Bind::IntArray(v) => builder.push_bind(v.clone()),
                };
                rest = &rest[pos + PLACEHOLDER.len()..];
            }
            builder.push(rest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(set: &PredicateSet) -> String {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions");
        set.push_where(&mut builder);
        builder.sql().to_string()
    }

    #[test]
    fn empty_set_appends_no_clause() {
        assert_eq!(
            render(&PredicateSet::new()),
            "SELECT COUNT(*) FROM transactions"
        );
    }

    #[test]
    fn single_predicate_renders_where() {
        let mut set = PredicateSet::new();
        set.push(Predicate::new(
            "receiver_id = $_",
            vec![Bind::Text("123".into())],
        ));
        assert_eq!(
            render(&set),
            "SELECT COUNT(*) FROM transactions WHERE receiver_id = $1"
        );
    }

    #[test]
    fn predicates_combine_with_and_and_renumber() {
        let mut set = PredicateSet::new();
        set.push(Predicate::new(
            "(payer_id = $_ OR receiver_id = $_)",
            vec![Bind::Text("a".into()), Bind::Text("a".into())],
        ));
        set.push(Predicate::new(
            "EXTRACT(MONTH FROM reference_date)::int = ANY($_)",
            vec![Bind::IntArray(vec![1, 2])],
        ));
        set.push(Predicate::new(
            "description = ANY($_)",
            vec![Bind::TextArray(vec!["PIX".into()])],
        ));
        assert_eq!(
            render(&set),
            "SELECT COUNT(*) FROM transactions \
             WHERE (payer_id = $1 OR receiver_id = $2) \
             AND EXTRACT(MONTH FROM reference_date)::int = ANY($3) \
             AND description = ANY($4)"
        );
    }

    #[test]
    fn parameters_keep_numbering_past_earlier_pushes() {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM transactions");
        let mut set = PredicateSet::new();
        set.push(Predicate::new("payer_id = $_", vec![Bind::Text("x".into())]));
        set.push_where(&mut builder);
        builder.push(" ORDER BY reference_date DESC LIMIT ");
        builder.push_bind(20i64);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM transactions WHERE payer_id = $1 ORDER BY reference_date DESC LIMIT $2"
        );
    }

    #[test]
    #[should_panic(expected = "placeholders")]
    fn bind_count_mismatch_panics() {
        Predicate::new("payer_id = $_", vec![]);
    }
}
