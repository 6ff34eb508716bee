//! Proptest generators for property-based testing.
//!
//! Principals and categories are drawn from small pools so that random
//! operation sequences collide on keys often enough to exercise conflicts,
//! renewals and revocations.

use proptest::prelude::*;

use consent_kernel_core::{
    AccessAudit, BlockHeight, Call, Category, Engine, Principal, Result, DEFAULT_CATEGORIES,
};

use crate::fixtures::{category, principal};

const PARTIES: [&str; 5] = ["p0", "p1", "p2", "p3", "p4"];

/// One of a small pool of principals.
pub fn party() -> impl Strategy<Value = Principal> {
    prop::sample::select(PARTIES.to_vec()).prop_map(principal)
}

/// One of the bootstrap categories.
pub fn default_category() -> impl Strategy<Value = Category> {
    prop::sample::select(DEFAULT_CATEGORIES.to_vec()).prop_map(category)
}

/// Mostly bootstrap categories, sometimes an unregistered label.
pub fn any_category() -> impl Strategy<Value = Category> {
    prop_oneof![
        4 => default_category(),
        1 => prop::sample::select(vec!["dental", "vision"]).prop_map(category),
    ]
}

/// A grant or renewal length, including the invalid zero.
pub fn duration() -> impl Strategy<Value = u64> {
    prop_oneof![1 => Just(0u64), 9 => 1u64..200]
}

/// A single engine operation.
#[derive(Debug, Clone)]
pub enum Op {
    Grant {
        caller: Principal,
        granter: Principal,
        grantee: Principal,
        category: Category,
        duration: u64,
    },
    GrantAsDelegate {
        caller: Principal,
        granter: Principal,
        grantee: Principal,
        category: Category,
        duration: u64,
    },
    Revoke {
        caller: Principal,
        granter: Principal,
        grantee: Principal,
        category: Category,
    },
    Renew {
        caller: Principal,
        granter: Principal,
        grantee: Principal,
        category: Category,
        extra: u64,
    },
    AddDelegate {
        caller: Principal,
        delegate: Principal,
    },
    RemoveDelegate {
        caller: Principal,
        delegate: Principal,
    },
    AddCategory {
        category: Category,
    },
}

pub fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (party(), party(), party(), any_category(), duration()).prop_map(
            |(caller, granter, grantee, category, duration)| Op::Grant {
                caller,
                granter,
                grantee,
                category,
                duration,
            }
        ),
        2 => (party(), party(), party(), any_category(), duration()).prop_map(
            |(caller, granter, grantee, category, duration)| Op::GrantAsDelegate {
                caller,
                granter,
                grantee,
                category,
                duration,
            }
        ),
        2 => (party(), party(), party(), any_category()).prop_map(
            |(caller, granter, grantee, category)| Op::Revoke {
                caller,
                granter,
                grantee,
                category,
            }
        ),
        3 => (party(), party(), party(), any_category(), duration()).prop_map(
            |(caller, granter, grantee, category, extra)| Op::Renew {
                caller,
                granter,
                grantee,
                category,
                extra,
            }
        ),
        2 => (party(), party()).prop_map(|(caller, delegate)| Op::AddDelegate { caller, delegate }),
        1 => (party(), party())
            .prop_map(|(caller, delegate)| Op::RemoveDelegate { caller, delegate }),
        1 => any_category().prop_map(|category| Op::AddCategory { category }),
    ]
}

/// A sequence of operations, each with the gap to the previous one.
pub fn timed_ops(max_len: usize) -> impl Strategy<Value = Vec<(Op, u64)>> {
    prop::collection::vec((op(), 0u64..20), 0..=max_len)
}

/// Run `op` at time `at`.
pub fn apply_op<A: AccessAudit>(engine: &mut Engine<A>, op: &Op, at: BlockHeight) -> Result<()> {
    match op {
        Op::Grant {
            caller,
            granter,
            grantee,
            category,
            duration,
        } => engine
            .grant(&Call::new(caller.clone(), at), granter, grantee, category, *duration, None)
            .map(|_| ()),
        Op::GrantAsDelegate {
            caller,
            granter,
            grantee,
            category,
            duration,
        } => engine
            .grant_as_delegate(
                &Call::new(caller.clone(), at),
                granter,
                grantee,
                category,
                *duration,
                None,
            )
            .map(|_| ()),
        Op::Revoke {
            caller,
            granter,
            grantee,
            category,
        } => engine.revoke(&Call::new(caller.clone(), at), granter, grantee, category),
        Op::Renew {
            caller,
            granter,
            grantee,
            category,
            extra,
        } => engine
            .renew(&Call::new(caller.clone(), at), granter, grantee, category, *extra)
            .map(|_| ()),
        Op::AddDelegate { caller, delegate } => {
            engine.add_delegate(&Call::new(caller.clone(), at), delegate.clone())
        }
        Op::RemoveDelegate { caller, delegate } => {
            engine.remove_delegate(&Call::new(caller.clone(), at), delegate)
        }
        Op::AddCategory { category } => {
            engine.add_category(&Call::new(principal("admin"), at), category.clone())
        }
    }
}

/// Run a timed sequence from height 0, ignoring rejections. Returns the
/// final height.
pub fn run_ops<A: AccessAudit>(engine: &mut Engine<A>, ops: &[(Op, u64)]) -> BlockHeight {
    let mut at = 0;
    for (op, gap) in ops {
        at += gap;
        let _ = apply_op(engine, op, at);
    }
    at
}
