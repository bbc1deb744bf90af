//! Leaf lexemes: text, classes, bytes, any and end

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::frame::{Frame, Step};
use crate::parser::ast::{CharClass, Modifiers, SourceLocation};
use crate::reader::Reader;
use std::rc::Rc;

impl Engine {
    /// A literal string
    pub(crate) fn lex_text(
        &mut self,
        frame: &Frame,
        text: &Rc<str>,
        modifiers: &Modifiers,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        let modes = frame.modes.with(modifiers);
        let expected: Vec<u32> = text.chars().map(u32::from).collect();
        let reader = self.reader_mut(location)?;
        let matched = reader.peek_units(expected.len(), modes.reverse).is_some_and(|found| {
            found
                .iter()
                .zip(&expected)
                .all(|(&a, &b)| same_unit(a, b, modes.insensitive))
        });
        Ok(consume(reader, matched, expected.len(), modes.reverse))
    }

    /// One character in (or out of) a class
    pub(crate) fn lex_class(
        &mut self,
        frame: &Frame,
        class: &CharClass,
        modifiers: &Modifiers,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        let modes = frame.modes.with(modifiers);
        let reader = self.reader_mut(location)?;
        let matched = reader
            .peek_units(1, modes.reverse)
            .and_then(|units| char::from_u32(units[0]))
            .is_some_and(|c| class.matches(c, modes.insensitive));
        Ok(consume(reader, matched, 1, modes.reverse))
    }

    /// Raw byte values; never case-folded
    pub(crate) fn lex_bytes(&mut self, frame: &Frame, bytes: &Rc<[u8]>, location: SourceLocation) -> Result<Step, RuntimeError> {
        let reverse = frame.modes.reverse;
        let reader = self.reader_mut(location)?;
        let matched = reader
            .peek_units(bytes.len(), reverse)
            .is_some_and(|found| found.iter().zip(bytes.iter()).all(|(&a, &b)| a == u32::from(b)));
        Ok(consume(reader, matched, bytes.len(), reverse))
    }

    /// One unit, or one child node on a tree reader
    pub(crate) fn lex_any(&mut self, frame: &Frame, modifiers: &Modifiers, location: SourceLocation) -> Result<Step, RuntimeError> {
        let modes = frame.modes.with(modifiers);
        let reader = self.reader_mut(location)?;
        let matched = if matches!(reader, Reader::Units { .. }) {
            reader.peek_units(1, modes.reverse).is_some()
        } else {
            !reader.at_end(modes.reverse)
        };
        Ok(consume(reader, matched, 1, modes.reverse))
    }

    /// End of input in the matching direction
    pub(crate) fn lex_end(&mut self, frame: &Frame, location: SourceLocation) -> Result<Step, RuntimeError> {
        if self.reader(location)?.at_end(frame.modes.reverse) {
            Ok(Step::Done)
        } else {
            Ok(Step::Fail)
        }
    }
}

fn consume(reader: &mut Reader, matched: bool, count: usize, reverse: bool) -> Step {
    if matched {
        reader.advance(count, reverse);
        Step::Done
    } else {
        Step::Fail
    }
}

fn same_unit(a: u32, b: u32, insensitive: bool) -> bool {
    if a == b {
        return true;
    }
    if !insensitive {
        return false;
    }
    match (char::from_u32(a), char::from_u32(b)) {
        (Some(x), Some(y)) => x.to_lowercase().eq(y.to_lowercase()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_unit_folds_case_only_when_insensitive() {
        assert!(same_unit('a' as u32, 'A' as u32, true));
        assert!(!same_unit('a' as u32, 'A' as u32, false));
        assert!(!same_unit('a' as u32, 'b' as u32, true));
    }
}
