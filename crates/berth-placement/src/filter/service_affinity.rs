//! Co-locate a new instance with already placed instances of other
//! descriptions in the same context.
//!
//! HARD targets must all be reachable on one common set of hosts; their
//! host sets are intersected and an empty intersection is a conflict.
//! SOFT targets narrow the HARD result only when the narrowed set stays
//! non-empty. Without any HARD anchor, SOFT host sets are unioned.
//!
//! During a clustering operation, descriptions declaring a HARD affinity
//! toward the one being placed pull it onto their hosts as well.

use std::collections::BTreeSet;
use std::sync::Arc;

use berth_state::{ComputeDescription, DocumentReader};
use tracing::{debug, info, warn};

use crate::constraint::{AffinityConstraint, AffinityDirection, parse_constraints};
use crate::context::FilterContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::{hosts_per_constraint, reverse_constraints};
use crate::selection::{CandidateMap, retain_hosts};

#[derive(Debug, Clone)]
pub struct ServiceAffinityFilter {
    desc: Arc<ComputeDescription>,
}

/// Running intersection of HARD host sets.
struct HardAnchor<'a> {
    description: &'a str,
    hosts: Option<BTreeSet<String>>,
    targets: Vec<String>,
}

impl<'a> HardAnchor<'a> {
    fn new(description: &'a str) -> Self {
        Self {
            description,
            hosts: None,
            targets: Vec::new(),
        }
    }

    fn require(&mut self, target: &str, hosts: BTreeSet<String>) -> PlacementResult<()> {
        self.targets.push(target.to_string());
        let merged: BTreeSet<String> = match self.hosts.take() {
            Some(current) => current.intersection(&hosts).cloned().collect(),
            None => hosts,
        };
        if merged.is_empty() {
            warn!(
                description = self.description,
                targets = ?self.targets,
                "hard affinity targets share no host"
            );
            return Err(PlacementError::ConflictingAffinity {
                description: self.description.to_string(),
                targets: self.targets.clone(),
            });
        }
        self.hosts = Some(merged);
        Ok(())
    }
}

impl ServiceAffinityFilter {
    pub fn new(desc: Arc<ComputeDescription>) -> Self {
        Self { desc }
    }

    pub async fn filter(
        &self,
        reader: &dyn DocumentReader,
        ctx: &FilterContext,
        candidates: &CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let own: Vec<AffinityConstraint> = parse_constraints(&self.desc.affinity)?
            .into_iter()
            .filter(|c| !c.is_anti())
            .collect();

        let reciprocal: Vec<AffinityConstraint> = if ctx.is_clustering_operation() {
            reverse_constraints(reader, &self.desc, AffinityDirection::Affinity)
                .await?
                .into_iter()
                .filter(AffinityConstraint::is_hard)
                .collect()
        } else {
            Vec::new()
        };

        if own.is_empty() && reciprocal.is_empty() {
            return Ok(candidates.clone());
        }

        let (own_hosts, reciprocal_hosts) = futures_util::try_join!(
            hosts_per_constraint(reader, ctx, &own, candidates),
            hosts_per_constraint(reader, ctx, &reciprocal, candidates),
        )?;

        let mut anchor = HardAnchor::new(&self.desc.name);
        let mut soft_sets: Vec<BTreeSet<String>> = Vec::new();

        for (constraint, hosts) in own.iter().zip(own_hosts) {
            if hosts.is_empty() {
                if constraint.is_hard() {
                    warn!(
                        description = %self.desc.name,
                        target = %constraint.target_name,
                        context = %ctx.context_id,
                        "hard affinity target not placed"
                    );
                    return Err(PlacementError::AffinityTargetNotFound {
                        target: constraint.target_name.clone(),
                        context_id: ctx.context_id.clone(),
                    });
                }
                debug!(target = %constraint.target_name, "soft affinity target not placed, skipping");
                continue;
            }
            if constraint.is_hard() {
                anchor.require(&constraint.target_name, hosts)?;
            } else {
                soft_sets.push(hosts);
            }
        }

        for (constraint, hosts) in reciprocal.iter().zip(reciprocal_hosts) {
            if hosts.is_empty() {
                debug!(source = %constraint.target_name, "reciprocal affinity source not placed, skipping");
                continue;
            }
            anchor.require(&constraint.target_name, hosts)?;
        }

        let keep = match anchor.hosts {
            Some(mut hard) => {
                for soft in &soft_sets {
                    let narrowed: BTreeSet<String> = hard.intersection(soft).cloned().collect();
                    if !narrowed.is_empty() {
                        hard = narrowed;
                    }
                }
                hard
            }
            None if soft_sets.is_empty() => return Ok(candidates.clone()),
            None => soft_sets.into_iter().flatten().collect(),
        };

        info!(
            description = %self.desc.name,
            constraints = own.len(),
            reciprocal = reciprocal.len(),
            kept = keep.len(),
            "applied service affinity"
        );
        Ok(retain_hosts(candidates, &keep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_state::StateStore;

    use crate::context::CLUSTERING_OPERATION_KEY;
    use crate::test_support::{desc, links, place_instance, seed_hosts};

    struct Fixture {
        store: StateStore,
        candidates: CandidateMap,
    }

    impl Fixture {
        fn new(hosts: usize) -> Self {
            let store = StateStore::open_in_memory().unwrap();
            let candidates = seed_hosts(&store, hosts);
            Self { store, candidates }
        }

        /// Store description `name` and place one instance on each host.
        fn placed(&self, ctx: &str, name: &str, affinity: &[&str], hosts: &[&str]) -> ComputeDescription {
            let d = desc(name, affinity);
            self.store.put_description(&d).unwrap();
            for h in hosts {
                place_instance(&self.store, ctx, &d, h);
            }
            d
        }

        async fn run(&self, d: ComputeDescription, ctx: &FilterContext) -> PlacementResult<CandidateMap> {
            self.store.put_description(&d).unwrap();
            ServiceAffinityFilter::new(Arc::new(d))
                .filter(&self.store, ctx, &self.candidates)
                .await
        }
    }

    fn ctx() -> FilterContext {
        FilterContext::new("ctx", 1)
    }

    #[tokio::test]
    async fn no_constraints_pass_through() {
        let f = Fixture::new(3);
        let out = f.run(desc("web", &[]), &ctx()).await.unwrap();
        assert_eq!(out, f.candidates);
    }

    #[tokio::test]
    async fn anti_affinity_entries_are_ignored() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &[], &["/hosts/h1"]);
        let out = f.run(desc("web", &["!db"]), &ctx()).await.unwrap();
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn hard_affinity_selects_target_host() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &[], &["/hosts/h1"]);
        let out = f.run(desc("web", &["db"]), &ctx()).await.unwrap();
        assert_eq!(links(&out), vec!["/hosts/h1"]);
    }

    #[tokio::test]
    async fn hard_affinity_keeps_every_target_host() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &[], &["/hosts/h0", "/hosts/h2"]);
        let out = f.run(desc("web", &["db"]), &ctx()).await.unwrap();
        assert_eq!(links(&out), vec!["/hosts/h0", "/hosts/h2"]);
    }

    #[tokio::test]
    async fn hard_target_missing_is_error() {
        let f = Fixture::new(3);
        let err = f.run(desc("web", &["db"]), &ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            PlacementError::AffinityTargetNotFound { ref target, .. } if target == "db"
        ));

        // Described but not placed in this context.
        f.placed("other", "db", &[], &["/hosts/h0"]);
        let err = f.run(desc("web", &["db"]), &ctx()).await.unwrap_err();
        assert!(matches!(err, PlacementError::AffinityTargetNotFound { .. }));
    }

    #[tokio::test]
    async fn soft_target_missing_passes_through() {
        let f = Fixture::new(3);
        let out = f.run(desc("web", &["db:soft"]), &ctx()).await.unwrap();
        assert_eq!(out, f.candidates);
    }

    #[tokio::test]
    async fn hard_targets_on_different_hosts_conflict() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &[], &["/hosts/h0"]);
        f.placed("ctx", "cache", &[], &["/hosts/h1"]);
        let err = f.run(desc("web", &["db", "cache"]), &ctx()).await.unwrap_err();
        match err {
            PlacementError::ConflictingAffinity { description, targets } => {
                assert_eq!(description, "web");
                assert_eq!(targets, vec!["db", "cache"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(
            PlacementError::ConflictingAffinity {
                description: "web".into(),
                targets: vec![]
            }
            .to_string()
            .contains("two different hosts")
        );
    }

    #[tokio::test]
    async fn hard_targets_sharing_a_host_intersect() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &[], &["/hosts/h0", "/hosts/h1"]);
        f.placed("ctx", "cache", &[], &["/hosts/h1", "/hosts/h2"]);
        let out = f.run(desc("web", &["db", "cache"]), &ctx()).await.unwrap();
        assert_eq!(links(&out), vec!["/hosts/h1"]);
    }

    #[tokio::test]
    async fn hard_wins_over_soft() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &[], &["/hosts/h0"]);
        f.placed("ctx", "cache", &[], &["/hosts/h1"]);
        let out = f.run(desc("web", &["db", "cache:soft"]), &ctx()).await.unwrap();
        assert_eq!(links(&out), vec!["/hosts/h0"]);
    }

    #[tokio::test]
    async fn soft_narrows_compatible_hard_result() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &[], &["/hosts/h0", "/hosts/h1"]);
        f.placed("ctx", "cache", &[], &["/hosts/h1"]);
        let out = f.run(desc("web", &["db", "cache:soft"]), &ctx()).await.unwrap();
        assert_eq!(links(&out), vec!["/hosts/h1"]);
    }

    #[tokio::test]
    async fn soft_only_sets_union() {
        let f = Fixture::new(4);
        f.placed("ctx", "db", &[], &["/hosts/h0"]);
        f.placed("ctx", "cache", &[], &["/hosts/h2"]);
        let out = f
            .run(desc("web", &["db:soft", "cache:soft"]), &ctx())
            .await
            .unwrap();
        assert_eq!(links(&out), vec!["/hosts/h0", "/hosts/h2"]);
    }

    #[tokio::test]
    async fn reciprocal_affinity_needs_clustering_flag() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &["web"], &["/hosts/h2"]);

        let out = f.run(desc("web", &[]), &ctx()).await.unwrap();
        assert_eq!(out.len(), 3);

        let clustering = ctx().with_property(CLUSTERING_OPERATION_KEY, "true");
        let out = f.run(desc("web", &[]), &clustering).await.unwrap();
        assert_eq!(links(&out), vec!["/hosts/h2"]);
    }

    #[tokio::test]
    async fn reciprocal_soft_affinity_is_ignored() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &["web:soft"], &["/hosts/h2"]);
        let clustering = ctx().with_property(CLUSTERING_OPERATION_KEY, "true");
        let out = f.run(desc("web", &[]), &clustering).await.unwrap();
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn reciprocal_conflicting_with_own_hard_is_error() {
        let f = Fixture::new(3);
        f.placed("ctx", "db", &["web"], &["/hosts/h2"]);
        f.placed("ctx", "cache", &[], &["/hosts/h0"]);
        let clustering = ctx().with_property(CLUSTERING_OPERATION_KEY, "true");
        let err = f.run(desc("web", &["cache"]), &clustering).await.unwrap_err();
        assert!(matches!(err, PlacementError::ConflictingAffinity { .. }));
    }

    #[tokio::test]
    async fn other_context_instances_ignored() {
        let f = Fixture::new(3);
        let db = f.placed("ctx", "db", &[], &["/hosts/h0"]);
        place_instance(&f.store, "other", &db, "/hosts/h1");
        let out = f.run(desc("web", &["db"]), &ctx()).await.unwrap();
        assert_eq!(links(&out), vec!["/hosts/h0"]);
    }

    #[tokio::test]
    async fn malformed_entry_is_error() {
        let f = Fixture::new(1);
        let err = f.run(desc("web", &["!:soft"]), &ctx()).await.unwrap_err();
        assert!(matches!(err, PlacementError::InvalidConstraint(_)));
    }
}
