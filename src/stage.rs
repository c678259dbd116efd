//! Compilation stages
//!
//! Every declaration (class, field, function, parameter) carries a
//! [`CompilingStage`]. A stage value names the step the declaration is
//! waiting to perform; the handler for that step moves it forward. Stages
//! never regress, and re-running a handler whose step has already been done
//! is a successful no-op, so the driver can sweep declarations repeatedly
//! until a fixed point is reached.

use std::fmt;

/// The fixed, linearly ordered resolution steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CompilingStage {
    ParseClassName = 0,
    ParseParents = 1,
    ParseFields = 2,
    ValidateHierarchy = 3,
    InheritsFields = 4,
    ValidateNewFunctions = 5,
    InheritsInnerClasses = 6,
    ValidateMembers = 7,
    AllocateSlots = 8,
    CompileBody = 9,
    ClearResources = 10,
    Compiled = 11,
}

impl CompilingStage {
    pub const ALL: [CompilingStage; 12] = [
        CompilingStage::ParseClassName,
        CompilingStage::ParseParents,
        CompilingStage::ParseFields,
        CompilingStage::ValidateHierarchy,
        CompilingStage::InheritsFields,
        CompilingStage::ValidateNewFunctions,
        CompilingStage::InheritsInnerClasses,
        CompilingStage::ValidateMembers,
        CompilingStage::AllocateSlots,
        CompilingStage::CompileBody,
        CompilingStage::ClearResources,
        CompilingStage::Compiled,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Successor stage; `Compiled` is its own successor
    pub fn next(self) -> Self {
        Self::from_ordinal(self.ordinal() + 1).unwrap_or(CompilingStage::Compiled)
    }

    /// Predecessor stage; `ParseClassName` is its own predecessor
    pub fn previous(self) -> Self {
        match self.ordinal().checked_sub(1) {
            Some(ordinal) => Self::from_ordinal(ordinal).unwrap_or(self),
            None => self,
        }
    }

    pub fn is_compiled(self) -> bool {
        self == CompilingStage::Compiled
    }
}

impl fmt::Display for CompilingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of the guard every stage handler starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageGuard {
    /// The step has already been performed; report success without work
    Done,
    /// The declaration has not reached the step's precondition yet
    NotReady,
    /// Current stage equals the step; perform it
    Proceed,
}

impl StageGuard {
    pub fn check(current: CompilingStage, step: CompilingStage) -> Self {
        if current > step {
            StageGuard::Done
        } else if current < step {
            StageGuard::NotReady
        } else {
            StageGuard::Proceed
        }
    }
}

/// Monotonic stage cell owned by each declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageCell {
    stage: CompilingStage,
}

impl Default for StageCell {
    fn default() -> Self {
        Self::new(CompilingStage::ParseClassName)
    }
}

impl StageCell {
    pub fn new(stage: CompilingStage) -> Self {
        Self { stage }
    }

    pub fn get(&self) -> CompilingStage {
        self.stage
    }

    pub fn guard(&self, step: CompilingStage) -> StageGuard {
        StageGuard::check(self.stage, step)
    }

    /// Move to the successor stage
    pub fn advance(&mut self) {
        self.stage = self.stage.next();
    }

    /// Jump forward to a named later stage. Requests to move backwards are
    /// ignored: a stage never regresses.
    pub fn jump_to(&mut self, target: CompilingStage) {
        if target > self.stage {
            self.stage = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twelve_ordered_stages() {
        assert_eq!(CompilingStage::ALL.len(), 12);
        for pair in CompilingStage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), pair[1]);
            assert_eq!(pair[1].previous(), pair[0]);
        }
        assert_eq!(CompilingStage::Compiled.ordinal(), 11);
    }

    #[test]
    fn test_terminal_next_is_terminal() {
        assert_eq!(CompilingStage::Compiled.next(), CompilingStage::Compiled);
        assert_eq!(CompilingStage::ParseClassName.previous(), CompilingStage::ParseClassName);
    }

    #[test]
    fn test_guard_outcomes() {
        use CompilingStage::*;
        assert_eq!(StageGuard::check(InheritsFields, ParseFields), StageGuard::Done);
        assert_eq!(StageGuard::check(ParseParents, ParseFields), StageGuard::NotReady);
        assert_eq!(StageGuard::check(ParseFields, ParseFields), StageGuard::Proceed);
    }

    #[test]
    fn test_cell_never_regresses() {
        let mut cell = StageCell::new(CompilingStage::ParseFields);
        cell.jump_to(CompilingStage::InheritsFields);
        assert_eq!(cell.get(), CompilingStage::InheritsFields);
        cell.jump_to(CompilingStage::ParseParents);
        assert_eq!(cell.get(), CompilingStage::InheritsFields);
        cell.jump_to(CompilingStage::Compiled);
        cell.advance();
        assert_eq!(cell.get(), CompilingStage::Compiled);
    }
}
