//! Quantified groups: `<< p{1}, q?, r{1,2} >>{n,m}`
//!
//! Each repetition picks the first option that still has room, recording a
//! choice point so that a later failure moves on to the next option. The
//! group finishes at the first repetition where no option can continue and
//! every option's minimum (and the group bound) is met; otherwise it fails
//! back into its most recent choice.

use crate::interpreter::constants::{ENTRY, FAILED};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::frame::{Frame, Step};
use crate::memory::heap::{HeapObject, PatternUnion};
use crate::memory::value::Value;
use crate::parser::ast::{GroupOption, Quantifier, SourceLocation};

// The current option matched once
const OPTION_DONE: u32 = 1;

impl Engine {
    pub(crate) fn lex_quantified_group(
        &mut self,
        frame: &mut Frame,
        options: &[GroupOption],
        bound: Option<Quantifier>,
        signal: u32,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        match signal {
            ENTRY => {
                self.open_checkpoint(frame);
                let union = self.heap.allocate(HeapObject::PatternUnion(PatternUnion {
                    alternative: 0,
                    counts: vec![0; options.len()],
                    total: 0,
                    last_cursor: self.cursor_pos(location)?,
                }));
                self.set_state(frame, Value::Handle(union));
                self.try_option(frame, options, bound, 0, location)
            }
            FAILED => {
                let next = self.union_state(frame, location)?.alternative + 1;
                self.try_option(frame, options, bound, next, location)
            }
            OPTION_DONE => {
                let pos = self.cursor_pos(location)?;
                let mut union = self.union_state(frame, location)?;
                let started = union.last_cursor;
                if let Some(count) = union.counts.get_mut(union.alternative) {
                    *count += 1;
                }
                union.total += 1;
                let satisfied = group_satisfied(options, bound, &union);
                self.update_union(frame, location, |state| *state = union)?;
                if pos == started {
                    // An empty repetition cannot make progress
                    return if satisfied {
                        self.finish_quantified_group(frame, location)
                    } else {
                        Ok(Step::Fail)
                    };
                }
                self.try_option(frame, options, bound, 0, location)
            }
            other => Err(RuntimeError::internal(
                format!("quantified group resumed with signal {}", other),
                location,
            )),
        }
    }

    /// Start a repetition with the first option at or after `from` that
    /// still has room
    fn try_option(
        &mut self,
        frame: &mut Frame,
        options: &[GroupOption],
        bound: Option<Quantifier>,
        from: usize,
        location: SourceLocation,
    ) -> Result<Step, RuntimeError> {
        let union = self.union_state(frame, location)?;
        let room = bound.map_or(true, |b| b.allows_more(union.total));
        let next = options
            .iter()
            .enumerate()
            .skip(from)
            .find(|(k, option)| room && option.quantifier.allows_more(union.counts.get(*k).copied().unwrap_or(0)));

        let Some((k, option)) = next else {
            return if group_satisfied(options, bound, &union) {
                self.finish_quantified_group(frame, location)
            } else {
                Ok(Step::Fail)
            };
        };

        let pos = self.cursor_pos(location)?;
        self.update_union(frame, location, |state| {
            state.alternative = k;
            state.last_cursor = pos;
        })?;
        self.push_choice(frame);
        Ok(Step::Call {
            node: option.pattern,
            resume: OPTION_DONE,
        })
    }

    fn finish_quantified_group(&mut self, frame: &mut Frame, location: SourceLocation) -> Result<Step, RuntimeError> {
        self.commit_checkpoint(frame, location)?;
        Ok(Step::Done)
    }
}

fn group_satisfied(options: &[GroupOption], bound: Option<Quantifier>, union: &PatternUnion) -> bool {
    let options_met = options
        .iter()
        .zip(&union.counts)
        .all(|(option, &count)| option.quantifier.satisfied(count));
    options_met && bound.map_or(true, |b| b.satisfied(union.total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(quantifier: Quantifier) -> GroupOption {
        GroupOption { pattern: 0, quantifier }
    }

    #[test]
    fn test_group_satisfied_needs_every_minimum() {
        let options = [option(Quantifier::exactly(1)), option(Quantifier::between(0, 1).unwrap())];
        let mut union = PatternUnion {
            counts: vec![0, 1],
            total: 1,
            ..PatternUnion::default()
        };
        assert!(!group_satisfied(&options, None, &union));
        union.counts[0] = 1;
        union.total = 2;
        assert!(group_satisfied(&options, None, &union));
        assert!(!group_satisfied(&options, Some(Quantifier::exactly(3)), &union));
    }
}
