//! SQL lexer pass-through
//!
//! `sky_lex_sql` normalizes a SQL statement (literals replaced, whitespace
//! collapsed) and extracts a short title. It writes into caller-provided
//! buffers: a fixed title scratch and a statement buffer as long as the
//! input, which is enough because normalization never grows a statement.

use crate::buf::{BufRef, OutBuf};
use crate::error::{BridgeError, BridgeResult};
use crate::gate::Gate;

/// Size of the title scratch buffer handed to `sky_lex_sql`
pub const TITLE_CAPACITY: usize = 128;

/// Both outputs of `sky_lex_sql`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexedSql {
    /// Short title such as `SELECT FROM users`; `None` when libskylight
    /// produced none
    pub title: Option<Vec<u8>>,
    /// Normalized statement, never longer than the input
    pub statement: Vec<u8>,
}

/// Lex `sql`, keeping both the title and the normalized statement.
pub fn lex(gate: &Gate, sql: &[u8]) -> BridgeResult<LexedSql> {
    let lib = gate.libskylight()?;
    let input = BufRef::new(sql);
    let mut title = OutBuf::with_capacity(TITLE_CAPACITY);
    let mut statement = OutBuf::with_capacity(sql.len());

    let code =
        unsafe { (lib.api().lex_sql)(input.raw(), title.as_mut_ptr(), statement.as_mut_ptr()) };
    if code < 0 {
        return Err(BridgeError::LexFailed(code));
    }

    let title = title.into_written();
    Ok(LexedSql {
        title: (!title.is_empty()).then_some(title),
        statement: statement.into_written(),
    })
}

/// Lex `sql` and return only the normalized statement.
pub fn lex_sql(gate: &Gate, sql: &[u8]) -> BridgeResult<Vec<u8>> {
    lex(gate, sql).map(|lexed| lexed.statement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_lex_sql_requires_loaded_gate() {
        let gate = Gate::new();
        assert!(matches!(
            lex_sql(&gate, b"SELECT 1"),
            Err(BridgeError::NotLoaded)
        ));
    }

    #[test]
    fn test_lex_sql_normalizes() {
        let gate = testing::loaded_gate();
        let sql = b"SELECT * FROM users WHERE id = 1";
        let statement = lex_sql(&gate, sql).unwrap();
        assert_eq!(statement, b"SELECT * FROM users WHERE id = ?");
        assert!(statement.len() <= sql.len());
    }

    #[test]
    fn test_lex_sql_is_deterministic() {
        let gate = testing::loaded_gate();
        let sql = b"SELECT  name FROM   users WHERE email = 'a@b.c' LIMIT 10";
        let first = lex_sql(&gate, sql).unwrap();
        for _ in 0..5 {
            assert_eq!(lex_sql(&gate, sql).unwrap(), first);
        }
        assert!(first.len() <= sql.len());
    }

    #[test]
    fn test_lex_keeps_title() {
        let gate = testing::loaded_gate();
        let lexed = lex(&gate, b"SELECT * FROM users WHERE id = 1").unwrap();
        assert_eq!(lexed.title.as_deref(), Some(&b"SELECT FROM users"[..]));
    }

    #[test]
    fn test_lex_empty_input() {
        let gate = testing::loaded_gate();
        let lexed = lex(&gate, b"").unwrap();
        assert!(lexed.statement.is_empty());
        assert_eq!(lexed.title, None);
    }

    #[test]
    fn test_lex_failure() {
        let gate = testing::loaded_gate();
        assert!(matches!(
            lex_sql(&gate, testing::REJECT),
            Err(BridgeError::LexFailed(code)) if code < 0
        ));
    }
}
