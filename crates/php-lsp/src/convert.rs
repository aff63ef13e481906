use lsp_types::{Location, Position, Range};
use ropey::Rope;

use php_syntax::builtins::BUILTIN_URI;
use php_syntax::store::{SymbolRef, SymbolStore};
use php_syntax::symbol::Span;

use crate::state::WorldState;

/// Convert an LSP `Position` (UTF-16 column) to a byte offset in the rope.
pub fn position_to_byte_offset(rope: &Rope, position: Position) -> Option<usize> {
    let line = position.line as usize;
    if line >= rope.len_lines() {
        return None;
    }
    let line_char = rope.line_to_char(line);
    let line_cu = rope.char_to_utf16_cu(line_char);
    let target = (line_cu + position.character as usize).min(rope.len_utf16_cu());
    let char_idx = rope.utf16_cu_to_char(target);
    Some(rope.char_to_byte(char_idx))
}

/// Convert a byte offset to an LSP `Position` with a UTF-16 column.
pub fn byte_offset_to_position(rope: &Rope, byte_offset: usize) -> Position {
    let char_idx = rope.byte_to_char(byte_offset.min(rope.len_bytes()));
    let line = rope.char_to_line(char_idx);
    let line_char = rope.line_to_char(line);
    let character = rope.char_to_utf16_cu(char_idx) - rope.char_to_utf16_cu(line_char);
    Position {
        line: line as u32,
        character: character as u32,
    }
}

/// Exact range for a span when the document text is available; the span's
/// stored points (byte columns) otherwise.
pub fn span_to_range(rope: Option<&Rope>, span: Span) -> Range {
    match rope {
        Some(rope) => Range {
            start: byte_offset_to_position(rope, span.start_byte),
            end: byte_offset_to_position(rope, span.end_byte),
        },
        None => Range {
            start: Position {
                line: span.start_point.row as u32,
                character: span.start_point.column as u32,
            },
            end: Position {
                line: span.end_point.row as u32,
                character: span.end_point.column as u32,
            },
        },
    }
}

/// Project a stored symbol to an editor location. Built-ins have no source
/// to navigate to and yield None.
pub fn symbol_location(
    state: &WorldState,
    store: &SymbolStore,
    symbol_ref: SymbolRef,
) -> Option<Location> {
    let table = store.table_by_hash(symbol_ref.uri_hash)?;
    if table.uri.as_str() == BUILTIN_URI {
        return None;
    }
    let symbol = table.get(symbol_ref.id);
    let span = if symbol.name_span == Span::default() {
        symbol.span
    } else {
        symbol.name_span
    };
    let rope = state.documents.get(&table.uri);
    Some(Location {
        uri: table.uri.clone(),
        range: span_to_range(rope.as_deref().map(|d| &d.rope), span),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_offset_round_trip_ascii() {
        let rope = Rope::from_str("<?php\n$a = 1;\n");
        let position = Position {
            line: 1,
            character: 5,
        };
        let offset = position_to_byte_offset(&rope, position).unwrap();
        assert_eq!(byte_offset_to_position(&rope, offset), position);
    }

    #[test]
    fn test_utf16_columns_for_multibyte_lines() {
        // 'é' is 2 bytes in UTF-8 but 1 UTF-16 code unit.
        let rope = Rope::from_str("<?php\n$café = 1;\n");
        let dollar = rope.to_string().find("$caf").unwrap();
        let after_e = dollar + "$café".len();
        let position = byte_offset_to_position(&rope, after_e);
        assert_eq!(position.line, 1);
        assert_eq!(position.character, 5);

        let back = position_to_byte_offset(&rope, position).unwrap();
        assert_eq!(back, after_e);
    }

    #[test]
    fn test_out_of_range_line_is_none() {
        let rope = Rope::from_str("<?php\n");
        assert!(position_to_byte_offset(
            &rope,
            Position {
                line: 10,
                character: 0
            }
        )
        .is_none());
    }
}
