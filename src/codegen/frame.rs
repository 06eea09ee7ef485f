//! Stack frame layout and calling convention.
//!
//! The first four arguments travel in `$a0-$a3`; arguments beyond that sit
//! on the caller's stack and are read through the callee's `$fp` at
//! `8 + 4*(i-5)` for the 1-indexed argument position `i` (the fixed
//! `8` skips the saved `$ra`/old `$fp` pair the prologue pushes).

use std::collections::HashMap;

pub const ARG_REGISTERS: &[&str] = &["$a0", "$a1", "$a2", "$a3"];

/// Where a one-word quantity lives on entry to a function: a register (the
/// first four arguments) or a caller-stack slot addressed off `$fp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Register(&'static str),
    StackOffset(i32),
}

#[derive(Debug)]
pub struct StackFrame {
    /// 0-indexed parameter name -> where it is read from on entry.
    pub param_locations: HashMap<String, ParamLocation>,
    /// Bytes reserved below the saved `$ra`/`$fp` pair for this function's
    /// own callee-saved registers ($s0-$s7, saved unconditionally on entry
    /// since this backend does no liveness analysis to narrow the set).
    pub saved_register_area: i32,
}

impl StackFrame {
    /// `param_names` is the function's declared parameter list in order,
    /// with the implicit `__env` record (if any) already prepended by the
    /// IR generator, since it occupies argument position 1 at the call
    /// site exactly like any other parameter.
    pub fn new(param_names: &[String]) -> Self {
        let mut param_locations = HashMap::new();
        for (i, name) in param_names.iter().enumerate() {
            let location = if i < ARG_REGISTERS.len() {
                ParamLocation::Register(ARG_REGISTERS[i])
            } else {
                ParamLocation::StackOffset(8 + 4 * (i as i32 - 4))
            };
            param_locations.insert(name.clone(), location);
        }
        StackFrame {
            param_locations,
            saved_register_area: 8 * 4,
        }
    }

    pub fn location_of(&self, param_name: &str) -> Option<ParamLocation> {
        self.param_locations.get(param_name).copied()
    }

    /// Total bytes the prologue must subtract from `$sp`: the saved
    /// register area plus the fixed two words for `$ra`/old `$fp`.
    pub fn frame_size(&self) -> i32 {
        self.saved_register_area + 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_four_params_use_argument_registers() {
        let frame = StackFrame::new(&["a".into(), "b".into(), "c".into(), "d".into()]);
        assert_eq!(frame.location_of("a"), Some(ParamLocation::Register("$a0")));
        assert_eq!(frame.location_of("d"), Some(ParamLocation::Register("$a3")));
    }

    #[test]
    fn fifth_param_reads_from_eight_fp() {
        let frame = StackFrame::new(&["a".into(), "b".into(), "c".into(), "d".into(), "e".into()]);
        assert_eq!(frame.location_of("e"), Some(ParamLocation::StackOffset(8)));
    }

    #[test]
    fn sixth_param_reads_from_twelve_fp() {
        let frame = StackFrame::new(&["a".into(), "b".into(), "c".into(), "d".into(), "e".into(), "f".into()]);
        assert_eq!(frame.location_of("f"), Some(ParamLocation::StackOffset(12)));
    }
}
