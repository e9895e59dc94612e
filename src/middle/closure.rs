//! Closure analysis over a group of mutually recursive functions.
//!
//! While checking bodies the analyzer marks the outer variables a function
//! touches directly. A function also needs every outer variable used by the
//! functions it calls, unless the name is bound locally at the call site. This
//! is propagated here until nothing changes. Sets only grow and are bounded by
//! the variables in scope, so the loop terminates.

use std::collections::BTreeSet;

use crate::{
    frontend::intern::Symbol,
    index::IndexVec,
    middle::env::{FuncEntry, FuncId},
};

/// Propagates foreign variables through the invocations recorded on the
/// functions of `group`. Returns the number of sweeps made, including the
/// final one that changed nothing.
pub fn solve_foreigns(functions: &mut IndexVec<FuncId, FuncEntry>, group: &[FuncId]) -> usize {
    let mut sweeps = 0;

    loop {
        sweeps += 1;
        let mut changed = false;

        for &caller in group {
            // The callee may be the caller itself
            let incoming: BTreeSet<Symbol> = functions[caller]
                .invokings
                .iter()
                .filter_map(|invoking| {
                    let callee = functions.get(invoking.callee)?;
                    Some(
                        callee
                            .foreigns
                            .difference(&invoking.locals)
                            .copied()
                            .collect::<Vec<_>>(),
                    )
                })
                .flatten()
                .collect();

            let foreigns = &mut functions[caller].foreigns;
            let before = foreigns.len();
            foreigns.extend(incoming);
            changed |= foreigns.len() != before;
        }

        if !changed {
            break;
        }
    }

    tracing::trace!(sweeps, functions = group.len(), "solved foreign variables");

    sweeps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{env::Invoking, ty::Type};

    fn function(name: &str) -> FuncEntry {
        let mut entry = FuncEntry::new_extern(Symbol::new(name), Vec::new(), Type::Void);
        entry.is_extern = false;
        entry
    }

    fn names(names: &[&str]) -> BTreeSet<Symbol> {
        names.iter().map(|name| Symbol::new(name)).collect()
    }

    #[test]
    fn callers_inherit_foreigns_of_callees() {
        let mut functions = IndexVec::new();
        let a = functions.push(function("a"));
        let b = functions.push(function("b"));

        functions[b].foreigns = names(&["x"]);
        functions[a].invokings.push(Invoking {
            callee: b,
            locals: names(&["y"]),
        });
        functions[b].invokings.push(Invoking {
            callee: a,
            locals: BTreeSet::new(),
        });

        let sweeps = solve_foreigns(&mut functions, &[a, b]);

        assert_eq!(functions[a].foreigns, names(&["x"]));
        assert_eq!(functions[b].foreigns, names(&["x"]));
        assert!(sweeps >= 2);
    }

    #[test]
    fn names_bound_at_the_call_site_are_not_inherited() {
        let mut functions = IndexVec::new();
        let a = functions.push(function("a"));
        let b = functions.push(function("b"));

        functions[b].foreigns = names(&["x", "z"]);
        functions[a].invokings.push(Invoking {
            callee: b,
            locals: names(&["x"]),
        });

        solve_foreigns(&mut functions, &[a, b]);

        assert_eq!(functions[a].foreigns, names(&["z"]));
    }

    #[test]
    fn propagates_along_chains() {
        let mut functions = IndexVec::new();
        let a = functions.push(function("a"));
        let b = functions.push(function("b"));
        let c = functions.push(function("c"));

        functions[c].foreigns = names(&["deep"]);
        functions[a].invokings.push(Invoking {
            callee: b,
            locals: BTreeSet::new(),
        });
        functions[b].invokings.push(Invoking {
            callee: c,
            locals: BTreeSet::new(),
        });

        solve_foreigns(&mut functions, &[a, b, c]);

        assert!(functions[a].foreigns.contains(&Symbol::new("deep")));
    }

    #[test]
    fn terminates_without_invokings() {
        let mut functions = IndexVec::new();
        let a = functions.push(function("a"));

        assert_eq!(solve_foreigns(&mut functions, &[a]), 1);
        assert!(functions[a].foreigns.is_empty());
    }
}
