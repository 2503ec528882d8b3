pub const SQL_KEYWORDS: &[&str] = &[
    // operators
    "AND",
    "OR",
    "LIKE",
    "BETWEEN",
    "IN",
    // literals
    "TRUE",
    "FALSE",
    "NULL",
    // statements and clauses
    "BEGIN",
    "COMMIT",
    "ROLLBACK",
    "TRANS",
    "TRANSACTION",
    "ANALYZE",
    "CHECKPOINT",
    "REBUILD",
    "PRAGMA",
    "CREATE",
    "INDEX",
    "ON",
    "UNIQUE",
    "DELETE",
    "DROP",
    "COLLECTION",
    "RENAME",
    "TO",
    "INSERT",
    "INTO",
    "VALUES",
    "SELECT",
    "ALL",
    "FULL",
    "FROM",
    "WHERE",
    "INCLUDE",
    "GROUP",
    "ORDER",
    "BY",
    "AS",
    "ASC",
    "DESC",
    "HAVING",
    "LIMIT",
    "OFFSET",
    "FOR",
    "SET",
    "EXPLAIN",
    "UPDATE",
    "REPLACE",
    "VACUUM",
    "CHECK",
    "MAP",
    "FILTER",
    "SORT",
    // pragmas and functions
    "USER_VERSION",
    "COLLATION",
    "TIMEOUT",
    "LIMIT_SIZE",
    "UTC_DATE",
    "COUNT",
    "MIN",
    "MAX",
    "FIRST",
    "LAST",
    "AVG",
    "SUM",
    "ANY",
    "JOIN",
    "MINVALUE",
    "OBJECTID",
    "GUID",
    "NOW",
    "NOW_UTC",
    "TODAY",
    "MAXVALUE",
    "INT32",
    "INT",
    "INT64",
    "LONG",
    "DOUBLE",
    "DECIMAL",
    "STRING",
    "ARRAY",
    "BINARY",
    "BOOLEAN",
    "BOOL",
    "DATETIME",
    "DATETIME_UTC",
    "DATE",
    "DATE_UTC",
    "IS_MINVALUE",
    "IS_NULL",
    "IS_INT32",
    "IS_INT",
    "IS_INT64",
    "IS_LONG",
    "IS_DOUBLE",
    "IS_DECIMAL",
    "IS_NUMBER",
    "IS_STRING",
    "IS_DOCUMENT",
    "IS_ARRAY",
    "IS_BINARY",
    "IS_OBJECTID",
    "IS_GUID",
    "IS_BOOLEAN",
    "IS_BOOL",
    "IS_DATETIME",
    "IS_DATE",
    "IS_MAXVALUE",
    "YEAR",
    "MONTH",
    "DAY",
    "HOUR",
    "MINUTE",
    "SECOND",
    "DATEADD",
    "DATEDIFF",
    "TO_LOCAL",
    "TO_UTC",
    "ABS",
    "ROUND",
    "POW",
    "JSON",
    "EXTEND",
    "ITEMS",
    "CONCAT",
    "RAW_ID",
    "KEYS",
    "OID_CREATIONTIME",
    "IIF",
    "COALESCE",
    "LENGTH",
    "TOP",
    "UNION",
    "EXCEPT",
    "DISTINCT",
    "LOWER",
    "UPPER",
    "LTRIM",
    "RTRIM",
    "TRIM",
    "INDEXOF",
    "SUBSTRING",
    "LPAD",
    "RPAD",
    "SPLIT",
    "FORMAT",
    "IS_MATCH",
    "MATCH",
];

#[must_use]
pub fn filter_keywords(prefix: &str) -> Vec<&'static str> {
    if prefix.is_empty() {
        return Vec::new();
    }

    SQL_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| {
            keyword
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
        .collect()
}
