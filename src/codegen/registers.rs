//! Register allocation.
//!
//! Two disjoint first-fit pools: `$t0-$t9` for values live only within the
//! statement that produced them, `$s0-$s7` for anything a register
//! allocator would otherwise need to spill across a call. There is no
//! spill path -- running out of either pool is a hard `ResourceError`.

use std::collections::HashMap;

use crate::errors::CompileError;

const TEMP_REGISTERS: &[&str] = &["$t0", "$t1", "$t2", "$t3", "$t4", "$t5", "$t6", "$t7", "$t8", "$t9"];
const SAVED_REGISTERS: &[&str] = &["$s0", "$s1", "$s2", "$s3", "$s4", "$s5", "$s6", "$s7"];

#[derive(Debug, Default)]
pub struct RegisterAllocator {
    /// Maps an IR name (temporary or promoted local) to the physical
    /// register currently holding it, for the function being emitted.
    bindings: HashMap<String, &'static str>,
    free_temps: Vec<&'static str>,
    free_saved: Vec<&'static str>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        RegisterAllocator {
            bindings: HashMap::new(),
            free_temps: TEMP_REGISTERS.iter().rev().copied().collect(),
            free_saved: SAVED_REGISTERS.iter().rev().copied().collect(),
        }
    }

    /// Resets all bindings at a function boundary; registers are never live
    /// across `BEGIN_FUNC`/`END_FUNC`.
    pub fn reset_function(&mut self) {
        self.bindings.clear();
        self.free_temps = TEMP_REGISTERS.iter().rev().copied().collect();
        self.free_saved = SAVED_REGISTERS.iter().rev().copied().collect();
    }

    pub fn allocate_temp(&mut self, name: &str) -> Result<&'static str, CompileError> {
        if let Some(existing) = self.bindings.get(name) {
            return Ok(existing);
        }
        let reg = self
            .free_temps
            .pop()
            .ok_or_else(|| CompileError::resource("out of temporary registers ($t0-$t9 exhausted)"))?;
        self.bindings.insert(name.to_string(), reg);
        Ok(reg)
    }

    pub fn allocate_saved(&mut self, name: &str) -> Result<&'static str, CompileError> {
        if let Some(existing) = self.bindings.get(name) {
            return Ok(existing);
        }
        let reg = self
            .free_saved
            .pop()
            .ok_or_else(|| CompileError::resource("out of saved registers ($s0-$s7 exhausted)"))?;
        self.bindings.insert(name.to_string(), reg);
        Ok(reg)
    }

    pub fn free_temp(&mut self, name: &str) {
        if let Some(reg) = self.bindings.remove(name) {
            if TEMP_REGISTERS.contains(&reg) {
                self.free_temps.push(reg);
            }
        }
    }

    pub fn current_binding(&self, name: &str) -> Option<&'static str> {
        self.bindings.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocating_the_same_name_twice_returns_the_same_register() {
        let mut regs = RegisterAllocator::new();
        let a = regs.allocate_temp("t0").unwrap();
        let b = regs.allocate_temp("t0").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exhausting_the_temp_pool_is_a_resource_error() {
        let mut regs = RegisterAllocator::new();
        for i in 0..10 {
            regs.allocate_temp(&format!("t{}", i)).unwrap();
        }
        let err = regs.allocate_temp("t10").unwrap_err();
        assert_eq!(err.kind(), "ResourceError");
    }

    #[test]
    fn freeing_a_temp_returns_it_to_the_pool() {
        let mut regs = RegisterAllocator::new();
        for i in 0..10 {
            regs.allocate_temp(&format!("t{}", i)).unwrap();
        }
        regs.free_temp("t3");
        assert!(regs.allocate_temp("t10").is_ok());
    }

    #[test]
    fn reset_function_clears_all_bindings() {
        let mut regs = RegisterAllocator::new();
        regs.allocate_temp("t0").unwrap();
        regs.allocate_saved("total").unwrap();
        regs.reset_function();
        assert!(regs.current_binding("t0").is_none());
        assert!(regs.current_binding("total").is_none());
    }
}
