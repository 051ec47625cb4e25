//! Arbitration between the displayed snapshot and incoming candidates.
//!
//! [`ReconciliationPolicy::arbitrate`] is pure: it inspects the current
//! snapshot, the candidate and the pending mutation (if any) and returns a
//! [`Verdict`]. Applying the verdict is the caller's job; pending-mutation
//! bookkeeping is never touched here.
//!
//! # Rules
//!
//! 1. A confirmation of the currently pending mutation replaces the
//!    optimistic guess. A versioned confirmation older than the displayed
//!    version is stale: a concurrent write already moved the server past
//!    it. At equal version it wins only if nothing was accepted since the
//!    optimistic write.
//! 2. A versioned candidate is accepted only if strictly newer. An equal
//!    version is a duplicate (first processed wins), an older one is stale.
//! 3. An unversioned candidate is accepted if its state differs from the
//!    displayed one, advancing the logical clock by one. While a mutation
//!    is pending, a push/poll candidate equal to that mutation's prior state
//!    is ignored: it describes the server before our request landed.
//!
//! Resource-specific refusals (such as lifecycle regressions from
//! unversioned pushes) are applied by the view before arbitration.

use std::fmt;

use crate::domain::{Candidate, CandidateSource, PendingMutation, ResourceSnapshot, Version};

/// Why a candidate was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Candidate version is older than the displayed one.
    Stale {
        /// Displayed version.
        current: Version,
        /// Rejected candidate version.
        candidate: Version,
    },
    /// Candidate version equals the displayed one; already applied.
    Duplicate(Version),
    /// Candidate would not change the displayed snapshot.
    Unchanged,
    /// Unversioned candidate equal to the pending mutation's prior state.
    PredatesPendingMutation,
    /// Unversioned candidate that would move the resource backwards.
    Regression,
    /// The owning view has been torn down.
    ViewClosed,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale { current, candidate } => {
                write!(f, "stale candidate {candidate} behind {current}")
            }
            Self::Duplicate(v) => write!(f, "duplicate of {v}"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::PredatesPendingMutation => f.write_str("predates pending mutation"),
            Self::Regression => f.write_str("backward move without version"),
            Self::ViewClosed => f.write_str("view closed"),
        }
    }
}

/// Outcome of arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Replace the displayed snapshot; `version` is the version to record.
    Accept {
        /// Version the snapshot carries after the write.
        version: Version,
    },
    /// Leave the snapshot untouched.
    Ignore(IgnoreReason),
}

impl Verdict {
    /// Returns `true` if the candidate was accepted.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// Decides whether a candidate replaces the displayed snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationPolicy;

impl ReconciliationPolicy {
    /// Creates the policy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Arbitrates `candidate` against `current`.
    ///
    /// `pending` is the mutation currently recorded for the subject, if any.
    /// A returned `Accept` version is never lower than `current.version`.
    #[must_use]
    pub fn arbitrate<S: PartialEq>(
        &self,
        current: &ResourceSnapshot<S>,
        candidate: &Candidate<S>,
        pending: Option<&PendingMutation<S>>,
    ) -> Verdict {
        if let CandidateSource::MutationConfirm(id) = candidate.source
            && let Some(pending) = pending.filter(|p| p.mutation_id == id)
        {
            return Self::arbitrate_confirmation(current, candidate, pending);
        }

        match candidate.version {
            Some(version) if version > current.version => Verdict::Accept { version },
            Some(version) if version == current.version => {
                Verdict::Ignore(IgnoreReason::Duplicate(version))
            }
            Some(version) => Verdict::Ignore(IgnoreReason::Stale {
                current: current.version,
                candidate: version,
            }),
            None => {
                if candidate.state == current.state {
                    return Verdict::Ignore(IgnoreReason::Unchanged);
                }
                if pending.is_some_and(|p| p.is_in_flight() && p.prior_state == candidate.state) {
                    return Verdict::Ignore(IgnoreReason::PredatesPendingMutation);
                }
                Verdict::Accept {
                    version: current.version.next(),
                }
            }
        }
    }

    fn arbitrate_confirmation<S: PartialEq>(
        current: &ResourceSnapshot<S>,
        candidate: &Candidate<S>,
        pending: &PendingMutation<S>,
    ) -> Verdict {
        let same_state = candidate.state == current.state;
        let untouched = current.revision == pending.applied_revision;
        match candidate.version {
            Some(version) if version > current.version => Verdict::Accept { version },
            Some(version) if version < current.version => Verdict::Ignore(IgnoreReason::Stale {
                current: current.version,
                candidate: version,
            }),
            Some(_) if same_state => Verdict::Ignore(IgnoreReason::Unchanged),
            Some(version) if untouched => Verdict::Accept { version },
            Some(version) => Verdict::Ignore(IgnoreReason::Duplicate(version)),
            None if same_state => Verdict::Ignore(IgnoreReason::Unchanged),
            None => Verdict::Accept {
                version: current.version.next(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{MutationId, SubjectId, Versioned};

    fn snapshot(state: &'static str, version: u64) -> ResourceSnapshot<&'static str> {
        ResourceSnapshot::new(
            SubjectId::from("order-1"),
            Versioned::new(state, Version::new(version)),
        )
    }

    fn push(state: &'static str, version: Option<u64>) -> Candidate<&'static str> {
        Candidate {
            state,
            version: version.map(Version::new),
            source: CandidateSource::Push,
        }
    }

    fn poll(state: &'static str, version: Option<u64>) -> Candidate<&'static str> {
        Candidate {
            source: CandidateSource::Poll,
            ..push(state, version)
        }
    }

    fn apply(
        snap: &mut ResourceSnapshot<&'static str>,
        candidate: &Candidate<&'static str>,
    ) -> Verdict {
        let verdict = ReconciliationPolicy::new().arbitrate(snap, candidate, None);
        if let Verdict::Accept { version } = verdict {
            snap.replace(candidate.state, version);
        }
        verdict
    }

    #[test]
    fn newer_version_is_accepted() {
        let snap = snapshot("pending", 1);
        let verdict = ReconciliationPolicy::new().arbitrate(&snap, &push("confirmed", Some(2)), None);
        assert_eq!(
            verdict,
            Verdict::Accept {
                version: Version::new(2)
            }
        );
    }

    #[test]
    fn older_version_never_regresses() {
        let mut snap = snapshot("preparing", 5);
        let verdict = apply(&mut snap, &poll("confirmed", Some(3)));
        assert_eq!(
            verdict,
            Verdict::Ignore(IgnoreReason::Stale {
                current: Version::new(5),
                candidate: Version::new(3),
            })
        );
        assert_eq!(snap.state, "preparing");
        assert_eq!(snap.version, Version::new(5));
    }

    #[test]
    fn equal_version_first_processed_wins() {
        let mut snap = snapshot("pending", 1);
        assert!(apply(&mut snap, &push("confirmed", Some(2))).is_accept());
        let second = apply(&mut snap, &poll("confirmed", Some(2)));
        assert_eq!(second, Verdict::Ignore(IgnoreReason::Duplicate(Version::new(2))));
        assert_eq!(snap.revision, 1);
    }

    #[test]
    fn converges_to_last_accepted_regardless_of_source() {
        let mut snap = snapshot("pending", 1);
        let sequence = [
            push("confirmed", Some(2)),
            poll("confirmed", Some(2)),
            poll("preparing", Some(4)),
            push("preparing", Some(3)),
            push("out_for_delivery", Some(6)),
            poll("preparing", Some(4)),
        ];
        for candidate in &sequence {
            let _ = apply(&mut snap, candidate);
        }
        assert_eq!(snap.state, "out_for_delivery");
        assert_eq!(snap.version, Version::new(6));
    }

    #[test]
    fn unversioned_candidate_advances_logical_clock() {
        let mut snap = snapshot("a", 0);
        assert_eq!(
            apply(&mut snap, &push("b", None)),
            Verdict::Accept {
                version: Version::new(1)
            }
        );
        assert_eq!(apply(&mut snap, &poll("b", None)), Verdict::Ignore(IgnoreReason::Unchanged));
        assert_eq!(snap.version, Version::new(1));
    }

    #[test]
    fn unversioned_prior_state_is_ignored_while_pending() {
        let snap = snapshot("liked", 0);
        let pending = PendingMutation::new(SubjectId::from("order-1"), "liked", "unliked", 1);
        let verdict =
            ReconciliationPolicy::new().arbitrate(&snap, &poll("unliked", None), Some(&pending));
        assert_eq!(verdict, Verdict::Ignore(IgnoreReason::PredatesPendingMutation));

        let other = ReconciliationPolicy::new().arbitrate(&snap, &push("other", None), Some(&pending));
        assert!(other.is_accept());
    }

    fn confirm(
        pending: &PendingMutation<&'static str>,
        state: &'static str,
        version: u64,
    ) -> Candidate<&'static str> {
        Candidate {
            state,
            version: Some(Version::new(version)),
            source: CandidateSource::MutationConfirm(pending.mutation_id),
        }
    }

    #[test]
    fn newer_confirmation_replaces_optimistic_guess() {
        let mut snap = snapshot("confirmed", 4);
        snap.overwrite_state("preparing");
        let pending = PendingMutation::new(SubjectId::from("order-1"), "preparing", "confirmed", 1);
        let candidate = confirm(&pending, "preparing", 5);
        let verdict = ReconciliationPolicy::new().arbitrate(&snap, &candidate, Some(&pending));
        assert_eq!(
            verdict,
            Verdict::Accept {
                version: Version::new(5)
            }
        );
    }

    #[test]
    fn confirmation_behind_concurrent_push_is_stale() {
        let mut snap = snapshot("confirmed", 4);
        snap.overwrite_state("preparing");
        let pending = PendingMutation::new(SubjectId::from("order-1"), "preparing", "confirmed", 1);
        snap.replace("out_for_delivery", Version::new(7));

        let candidate = confirm(&pending, "preparing", 5);
        let verdict = ReconciliationPolicy::new().arbitrate(&snap, &candidate, Some(&pending));
        assert_eq!(
            verdict,
            Verdict::Ignore(IgnoreReason::Stale {
                current: Version::new(7),
                candidate: Version::new(5),
            })
        );
    }

    #[test]
    fn equal_version_confirmation_depends_on_interleaving() {
        let mut snap = snapshot("confirmed", 4);
        snap.overwrite_state("preparing");
        let pending = PendingMutation::new(SubjectId::from("order-1"), "preparing", "confirmed", 1);
        let corrected = confirm(&pending, "cancelled", 4);
        assert!(ReconciliationPolicy::new().arbitrate(&snap, &corrected, Some(&pending)).is_accept());

        snap.replace("out_for_delivery", Version::new(4));
        assert_eq!(
            ReconciliationPolicy::new().arbitrate(&snap, &corrected, Some(&pending)),
            Verdict::Ignore(IgnoreReason::Duplicate(Version::new(4)))
        );
    }

    #[test]
    fn matching_confirmation_changes_nothing() {
        let snap = snapshot("cancelled", 3);
        let pending = PendingMutation::new(SubjectId::from("order-1"), "cancelled", "pending", 1);
        let confirm = Candidate {
            state: "cancelled",
            version: Some(Version::new(3)),
            source: CandidateSource::MutationConfirm(pending.mutation_id),
        };
        let verdict = ReconciliationPolicy::new().arbitrate(&snap, &confirm, Some(&pending));
        assert_eq!(verdict, Verdict::Ignore(IgnoreReason::Unchanged));
    }

    #[test]
    fn foreign_confirmation_follows_version_rules() {
        let snap = snapshot("cancelled", 5);
        let confirm = Candidate {
            state: "pending",
            version: Some(Version::new(2)),
            source: CandidateSource::MutationConfirm(MutationId::new()),
        };
        let verdict = ReconciliationPolicy::new().arbitrate(&snap, &confirm, None);
        assert!(matches!(verdict, Verdict::Ignore(IgnoreReason::Stale { .. })));
    }
}
