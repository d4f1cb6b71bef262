//! Resolves the `concurrency`/`max_memory` config expressions against the
//! host's actual CPU count and installed memory, then applies the clamp rule
//! and the memory-feasibility check.

use crate::constants::max_feasible_concurrency;
use crate::expr::{self, ExprError};

#[derive(Debug, thiserror::Error)]
pub enum LimitsError {
    #[error("invalid concurrency expression {0:?}: {1}")]
    ConcurrencyExpr(String, ExprError),
    #[error("invalid max_memory expression {0:?}: {1}")]
    MemoryExpr(String, ExprError),
    #[error("concurrency expression {0:?} evaluated to non-positive value {1}")]
    NonPositiveConcurrency(String, i64),
    #[error("max_memory expression {0:?} evaluated to non-positive value {1}")]
    NonPositiveMemory(String, i64),
    #[error(
        "max_memory {0} MiB cannot fit even one STC instance (needs at least {1} MiB); refusing to start"
    )]
    MemoryInfeasible(u64, u64),
}

/// Number of logical CPUs, falling back to 1 if the OS cannot report it.
pub fn cpu_count() -> u64 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u64)
        .unwrap_or(1)
}

/// Total installed physical memory, in MiB.
pub fn total_memory_mib() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.total_memory() / (1024 * 1024)
}

/// The outcome of resolving both expressions: what the worker will actually
/// advertise to the dispatcher, and whether the memory-feasibility check
/// forced concurrency down from what the expression asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimits {
    pub concurrency: u32,
    pub max_memory_mib: u64,
    pub concurrency_reduced: bool,
}

/// Evaluates `expr` and applies the concurrency clamp rule: the result is
/// accepted as-is only if the expression text contains the literal token
/// `MAX` and the value does not exceed `max_cpus`; otherwise it is clamped to
/// `min(value, max_cpus - 1)` so a naked constant cannot claim every core.
fn resolve_concurrency_expr(concurrency_expr: &str, max_cpus: u64) -> Result<u32, LimitsError> {
    let value = expr::eval(concurrency_expr, max_cpus as i64)
        .map_err(|err| LimitsError::ConcurrencyExpr(concurrency_expr.to_string(), err))?;
    if value <= 0 {
        return Err(LimitsError::NonPositiveConcurrency(
            concurrency_expr.to_string(),
            value,
        ));
    }
    let value = value as u64;
    let clamped = if expr::mentions_max(concurrency_expr) {
        value.min(max_cpus)
    } else {
        value.min(max_cpus.saturating_sub(1).max(1))
    };
    Ok(clamped.max(1) as u32)
}

fn resolve_memory_expr(memory_expr: &str, total_mem_mib: u64) -> Result<u64, LimitsError> {
    let value = expr::eval(memory_expr, total_mem_mib as i64)
        .map_err(|err| LimitsError::MemoryExpr(memory_expr.to_string(), err))?;
    if value <= 0 {
        return Err(LimitsError::NonPositiveMemory(memory_expr.to_string(), value));
    }
    Ok(value as u64)
}

/// Resolves both expressions against the real host's CPU count and installed
/// memory (see `cpu_count`/`total_memory_mib`).
pub fn resolve_limits(concurrency_expr: &str, memory_expr: &str) -> Result<ResolvedLimits, LimitsError> {
    resolve_limits_with(cpu_count(), total_memory_mib(), concurrency_expr, memory_expr)
}

/// Resolves both expressions, then reduces concurrency (silently, but the
/// caller gets `concurrency_reduced` to log it) if it exceeds the largest
/// concurrency that still lets one STC instance fit in `max_memory`.
/// Refuses to start if even a single instance does not fit. Takes the host's
/// CPU count and total memory as explicit parameters so callers (and tests)
/// can pin them rather than depending on the actual machine.
pub fn resolve_limits_with(
    max_cpus: u64,
    total_mem_mib: u64,
    concurrency_expr: &str,
    memory_expr: &str,
) -> Result<ResolvedLimits, LimitsError> {
    let requested_concurrency = resolve_concurrency_expr(concurrency_expr, max_cpus)?;
    let max_memory_mib = resolve_memory_expr(memory_expr, total_mem_mib)?;

    let max_conc = max_feasible_concurrency(max_memory_mib).ok_or(LimitsError::MemoryInfeasible(
        max_memory_mib,
        crate::constants::stc_memory_mib() + crate::constants::RUNNER_MEMORY_MIB,
    ))?;

    let (concurrency, concurrency_reduced) = if (requested_concurrency as u64) > max_conc {
        (max_conc as u32, true)
    } else {
        (requested_concurrency, false)
    };

    Ok(ResolvedLimits {
        concurrency,
        max_memory_mib,
        concurrency_reduced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_naked_constant_below_max() {
        assert_eq!(resolve_concurrency_expr("8", 8).unwrap(), 7);
    }

    #[test]
    fn accepts_full_max_when_expression_mentions_it() {
        assert_eq!(resolve_concurrency_expr("MAX", 8).unwrap(), 8);
    }

    #[test]
    fn rejects_non_positive_concurrency() {
        assert!(matches!(
            resolve_concurrency_expr("0", 8),
            Err(LimitsError::NonPositiveConcurrency(_, 0))
        ));
    }

    #[test]
    fn memory_infeasible_when_too_small() {
        let err = resolve_memory_expr("60", 4096).map(|mem| max_feasible_concurrency(mem));
        assert_eq!(err.unwrap(), None);
    }

    #[test]
    fn resolve_limits_reduces_concurrency_when_memory_constrained() {
        // 8 requested cores (with 16 available) but only ~472 MiB of memory:
        // each STC instance needs 2*(16+10+138+16)=360 MiB, so only one
        // instance fits after the 60 MiB runner floor is subtracted.
        let limits = resolve_limits_with(16, 472, "8", "472").unwrap();
        assert_eq!(limits.concurrency, 1);
        assert!(limits.concurrency_reduced);
    }

    #[test]
    fn resolve_limits_refuses_when_memory_too_small() {
        assert!(matches!(
            resolve_limits_with(8, 60, "MAX", "60"),
            Err(LimitsError::MemoryInfeasible(60, _))
        ));
    }

    #[test]
    fn resolve_limits_accepts_when_not_memory_constrained() {
        let limits = resolve_limits_with(8, 65536, "MAX-1", "MAX/2").unwrap();
        assert_eq!(limits.concurrency, 7);
        assert!(!limits.concurrency_reduced);
    }
}
