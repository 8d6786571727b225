//! Storage adapter: compiles typed predicate trees into parameterized SQL.
//!
//! The query layer never concatenates user text into SQL. It builds an
//! [`Expr`] tree of AND/OR/NOT over leaf comparisons, and this module
//! renders the tree into a WHERE clause with `?` placeholders plus the
//! ordered parameter list. Keeping the rendering here makes the composer's
//! logic testable without a database and keeps injection impossible by
//! construction.
//!
//! Text parameters arriving here are already percent-encoded with the
//! storage codec, matching how the columns are stored. `Contains` and
//! `NotContains` additionally escape the LIKE metacharacters of the needle,
//! so a literal `%` or `_` in a search term only matches itself.
//! `NotContains` and the `IN`-exclusions composed by the query layer are
//! null-safe: a row whose column is NULL does not "contain" anything and is
//! therefore kept by an exclusion.

use rusqlite::types::Value;

use crate::model::{
    ItemColumn, ItemSortKey, SortOrder, TermColumn, TermSortKey,
};
use crate::store::Store;

/// A column set an expression tree can be compiled against.
pub trait SqlColumn: Copy {
    const TABLE: &'static str;
    const ID: &'static str;
    fn sql_name(self) -> &'static str;
}

impl SqlColumn for ItemColumn {
    const TABLE: &'static str = "items";
    const ID: &'static str = "item_id";

    fn sql_name(self) -> &'static str {
        match self {
            ItemColumn::Id => "item_id",
            ItemColumn::Name => "item_name",
            ItemColumn::Type => "item_type",
            ItemColumn::Extension => "item_ext",
            ItemColumn::Source => "item_source",
            ItemColumn::Modified => "item_time",
            ItemColumn::Created => "item_creation_time",
            ItemColumn::Description => "item_description",
            ItemColumn::PrimaryCategory => "item_primary_category",
            ItemColumn::Hash => "item_md5",
        }
    }
}

impl SqlColumn for TermColumn {
    const TABLE: &'static str = "terms";
    const ID: &'static str = "term_id";

    fn sql_name(self) -> &'static str {
        match self {
            TermColumn::Id => "term_id",
            TermColumn::Name => "term_name",
            TermColumn::Taxonomy => "term_taxonomy",
            TermColumn::Description => "term_description",
            TermColumn::Parent => "term_parent",
            TermColumn::ItemCount => "term_count",
        }
    }
}

/// A leaf comparison operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Text(String),
}

impl From<Arg> for Value {
    fn from(arg: Arg) -> Value {
        match arg {
            Arg::Int(i) => Value::Integer(i),
            Arg::Text(t) => Value::Text(t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring match (LIKE with escaped needle)
    Contains,
    /// Null-safe negated substring match
    NotContains,
}

/// Relation-membership leaves, rendered as subqueries over the relation
/// table.
#[derive(Debug, Clone, PartialEq)]
pub enum Membership {
    /// Items related to the given term. A term id of -1 is the
    /// impossible-match guard used for unresolvable category references.
    ItemHasTerm(i64),
    /// Items with at least one relation into any of the given taxonomies
    ItemInTaxonomies(Vec<String>),
    /// Terms related to the given item
    TermHasItem(i64),
}

/// A typed predicate tree over one entity's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<C> {
    And(Vec<Expr<C>>),
    Or(Vec<Expr<C>>),
    Not(Box<Expr<C>>),
    Cmp(C, CmpOp, Arg),
    In(C, Vec<Arg>),
    /// `true` = IS NULL, `false` = IS NOT NULL
    Null(C, bool),
    Related(Membership),
    /// Rows whose value in the column is shared by at least one other row
    DuplicateGroup(C),
}

impl<C> Expr<C> {
    /// AND together the present groups; an empty list matches everything.
    pub fn all(groups: Vec<Expr<C>>) -> Expr<C> {
        Expr::And(groups)
    }
}

/// Escape LIKE metacharacters so the needle matches literally.
fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn render<C: SqlColumn>(expr: &Expr<C>, sql: &mut String, params: &mut Vec<Value>) {
    match expr {
        Expr::And(children) => {
            if children.is_empty() {
                sql.push_str("1 = 1");
                return;
            }
            sql.push('(');
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                render(child, sql, params);
            }
            sql.push(')');
        }
        Expr::Or(children) => {
            if children.is_empty() {
                sql.push_str("1 = 0");
                return;
            }
            sql.push('(');
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" OR ");
                }
                render(child, sql, params);
            }
            sql.push(')');
        }
        Expr::Not(child) => {
            sql.push_str("NOT ");
            render(child, sql, params);
        }
        Expr::Cmp(column, op, arg) => {
            let column = column.sql_name();
            match op {
                CmpOp::Contains | CmpOp::NotContains => {
                    let needle = match arg {
                        Arg::Text(t) => t.clone(),
                        Arg::Int(i) => i.to_string(),
                    };
                    let pattern = format!("%{}%", escape_like(&needle));
                    if *op == CmpOp::Contains {
                        sql.push_str(&format!("{column} LIKE ? ESCAPE '\\'"));
                    } else {
                        sql.push_str(&format!(
                            "({column} IS NULL OR {column} NOT LIKE ? ESCAPE '\\')"
                        ));
                    }
                    params.push(Value::Text(pattern));
                }
                plain => {
                    let op = match plain {
                        CmpOp::Eq => "=",
                        CmpOp::Ne => "!=",
                        CmpOp::Lt => "<",
                        CmpOp::Le => "<=",
                        CmpOp::Gt => ">",
                        CmpOp::Ge => ">=",
                        CmpOp::Contains | CmpOp::NotContains => unreachable!(),
                    };
                    sql.push_str(&format!("{column} {op} ?"));
                    params.push(arg.clone().into());
                }
            }
        }
        Expr::In(column, args) => {
            if args.is_empty() {
                sql.push_str("1 = 0");
                return;
            }
            let placeholders = vec!["?"; args.len()].join(", ");
            sql.push_str(&format!("{} IN ({placeholders})", column.sql_name()));
            params.extend(args.iter().cloned().map(Value::from));
        }
        Expr::Null(column, is_null) => {
            let suffix = if *is_null { "IS NULL" } else { "IS NOT NULL" };
            sql.push_str(&format!("{} {suffix}", column.sql_name()));
        }
        Expr::Related(membership) => match membership {
            Membership::ItemHasTerm(term) => {
                sql.push_str(
                    "item_id IN (SELECT item_id FROM term_relations WHERE term_id = ?)",
                );
                params.push(Value::Integer(*term));
            }
            Membership::ItemInTaxonomies(taxonomies) => {
                if taxonomies.is_empty() {
                    sql.push_str("1 = 0");
                    return;
                }
                let placeholders = vec!["?"; taxonomies.len()].join(", ");
                sql.push_str(&format!(
                    "item_id IN (SELECT tr.item_id FROM term_relations tr \
                     JOIN terms t ON t.term_id = tr.term_id \
                     WHERE t.term_taxonomy IN ({placeholders}))"
                ));
                params.extend(taxonomies.iter().cloned().map(Value::Text));
            }
            Membership::TermHasItem(item) => {
                sql.push_str(
                    "term_id IN (SELECT term_id FROM term_relations WHERE item_id = ?)",
                );
                params.push(Value::Integer(*item));
            }
        },
        Expr::DuplicateGroup(column) => {
            let column = column.sql_name();
            let table = C::TABLE;
            sql.push_str(&format!(
                "({column} IS NOT NULL AND {column} IN \
                 (SELECT {column} FROM {table} WHERE {column} IS NOT NULL \
                 GROUP BY {column} HAVING COUNT(*) > 1))"
            ));
        }
    }
}

/// Render an expression tree into a WHERE clause and its parameters.
pub fn compile<C: SqlColumn>(expr: &Expr<C>) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut params = Vec::new();
    render(expr, &mut sql, &mut params);
    (sql, params)
}

/// ORDER BY clause for item queries. Every sort appends the id as a
/// tie-break so repeated calls order identically. Stat-derived keys
/// (size, file modification time) sort by id here and are reordered after
/// the stats are computed.
pub fn item_order_by(sort: ItemSortKey, order: SortOrder) -> String {
    let direction = match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    let key = match sort {
        ItemSortKey::Id | ItemSortKey::Size | ItemSortKey::FileModified => {
            return format!("ORDER BY item_id {direction}");
        }
        ItemSortKey::Name => "item_name",
        ItemSortKey::Type => "item_type",
        ItemSortKey::Extension => "item_ext",
        ItemSortKey::Source => "item_source",
        ItemSortKey::Modified => "item_time",
        ItemSortKey::Created => "item_creation_time",
        ItemSortKey::Hash => "item_md5",
        ItemSortKey::RelationCount => {
            return format!(
                "ORDER BY (SELECT COUNT(*) FROM term_relations \
                 WHERE term_relations.item_id = items.item_id) {direction}, item_id ASC"
            );
        }
    };
    format!("ORDER BY {key} {direction}, item_id ASC")
}

/// ORDER BY clause for term queries, id tie-break included.
pub fn term_order_by(sort: TermSortKey, order: SortOrder) -> String {
    let direction = match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    let key = match sort {
        TermSortKey::Id => return format!("ORDER BY term_id {direction}"),
        TermSortKey::Name => "term_name",
        TermSortKey::Taxonomy => "term_taxonomy",
        TermSortKey::ItemCount => "term_count",
    };
    format!("ORDER BY {key} {direction}, term_id ASC")
}

/// Full SELECT for an item predicate tree.
pub fn item_select(
    expr: &Expr<ItemColumn>,
    sort: ItemSortKey,
    order: SortOrder,
) -> (String, Vec<Value>) {
    let (where_clause, params) = compile(expr);
    let sql = format!(
        "SELECT {} FROM items WHERE {} {}",
        Store::item_columns(),
        where_clause,
        item_order_by(sort, order)
    );
    (sql, params)
}

/// Full SELECT for a term predicate tree.
pub fn term_select(
    expr: &Expr<TermColumn>,
    sort: TermSortKey,
    order: SortOrder,
) -> (String, Vec<Value>) {
    let (where_clause, params) = compile(expr);
    let sql = format!(
        "SELECT {} FROM terms WHERE {} {}",
        Store::term_columns(),
        where_clause,
        term_order_by(sort, order)
    );
    (sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_groups() {
        let (sql, params) = compile::<ItemColumn>(&Expr::And(vec![]));
        assert_eq!(sql, "1 = 1");
        assert!(params.is_empty());

        let (sql, _) = compile::<ItemColumn>(&Expr::Or(vec![]));
        assert_eq!(sql, "1 = 0");

        let (sql, _) = compile::<ItemColumn>(&Expr::In(ItemColumn::Extension, vec![]));
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn test_contains_escapes_like_metacharacters() {
        let expr = Expr::Cmp(
            ItemColumn::Name,
            CmpOp::Contains,
            Arg::Text("50%_done".to_string()),
        );
        let (sql, params) = compile(&expr);
        assert_eq!(sql, "item_name LIKE ? ESCAPE '\\'");
        assert_eq!(params, vec![Value::Text("%50\\%\\_done%".to_string())]);
    }

    #[test]
    fn test_not_contains_is_null_safe() {
        let expr = Expr::Cmp(
            ItemColumn::Source,
            CmpOp::NotContains,
            Arg::Text("example.com".to_string()),
        );
        let (sql, _) = compile(&expr);
        assert_eq!(
            sql,
            "(item_source IS NULL OR item_source NOT LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_nested_tree() {
        let expr = Expr::And(vec![
            Expr::Or(vec![
                Expr::Cmp(ItemColumn::Type, CmpOp::Eq, Arg::Text("Image".to_string())),
                Expr::Cmp(ItemColumn::Type, CmpOp::Eq, Arg::Text("Video".to_string())),
            ]),
            Expr::Not(Box::new(Expr::Related(Membership::ItemHasTerm(7)))),
            Expr::Cmp(ItemColumn::Id, CmpOp::Ge, Arg::Int(10)),
        ]);
        let (sql, params) = compile(&expr);
        assert_eq!(
            sql,
            "((item_type = ? OR item_type = ?) AND \
             NOT item_id IN (SELECT item_id FROM term_relations WHERE term_id = ?) AND \
             item_id >= ?)"
        );
        assert_eq!(params.len(), 4);
        assert_eq!(params[2], Value::Integer(7));
    }

    #[test]
    fn test_duplicate_group() {
        let (sql, params) = compile::<ItemColumn>(&Expr::DuplicateGroup(ItemColumn::Hash));
        assert_eq!(
            sql,
            "(item_md5 IS NOT NULL AND item_md5 IN \
             (SELECT item_md5 FROM items WHERE item_md5 IS NOT NULL \
             GROUP BY item_md5 HAVING COUNT(*) > 1))"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_order_by_always_breaks_ties_on_id() {
        assert_eq!(
            item_order_by(ItemSortKey::Name, SortOrder::Descending),
            "ORDER BY item_name DESC, item_id ASC"
        );
        assert_eq!(
            item_order_by(ItemSortKey::Id, SortOrder::Ascending),
            "ORDER BY item_id ASC"
        );
        // stat-derived keys defer to the post-query sort
        assert_eq!(
            item_order_by(ItemSortKey::Size, SortOrder::Ascending),
            "ORDER BY item_id ASC"
        );
        assert_eq!(
            term_order_by(TermSortKey::ItemCount, SortOrder::Ascending),
            "ORDER BY term_count ASC, term_id ASC"
        );
    }
}
