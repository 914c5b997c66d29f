//! Consumer groups divide the partitions of one topic among their members.
//!
//! Every membership change recomputes the whole assignment from scratch with
//! the group's [`Rebalance`] strategy: partitions are taken in creation order,
//! members in the order they joined.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::consumer::Consumer;
use crate::error::{Entity, Error, Result};
use crate::partition::Partition;

pub const BALANCE_STRATEGY_RANGE: &str = "Range";
pub const BALANCE_STRATEGY_ROUNDROBIN: &str = "RoundRobin";

/// Per-member partition lists, indexed by membership position.
pub type Plan = Vec<Vec<Arc<Partition>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rebalance {
    /// Contiguous slices, the first `P % C` members get one extra partition.
    #[default]
    Range,
    /// Partition `i` goes to member `i % C`.
    RoundRobin,
}

impl Rebalance {
    /// Resolves `name`, falling back to [`Rebalance::Range`] for unknown names.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(name, "unknown rebalance strategy, using Range");
            Self::Range
        })
    }

    /// Computes the assignment of `partitions` over `members` consumers.
    ///
    /// Returns exactly `members` lists; empty when `members` is zero.
    pub fn assign(&self, partitions: &[Arc<Partition>], members: usize) -> Plan {
        if members == 0 {
            return vec![];
        }

        match self {
            Self::Range => range(partitions, members),
            Self::RoundRobin => round_robin(partitions, members),
        }
    }
}

impl Display for Rebalance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Range => f.write_str(BALANCE_STRATEGY_RANGE),
            Self::RoundRobin => f.write_str(BALANCE_STRATEGY_ROUNDROBIN),
        }
    }
}

impl FromStr for Rebalance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(BALANCE_STRATEGY_RANGE) {
            Ok(Self::Range)
        } else if s.eq_ignore_ascii_case(BALANCE_STRATEGY_ROUNDROBIN) {
            Ok(Self::RoundRobin)
        } else {
            Err(format!("unknown rebalance strategy '{s}'"))
        }
    }
}

fn round_robin(partitions: &[Arc<Partition>], members: usize) -> Plan {
    let mut plan = vec![vec![]; members];
    for (i, partition) in partitions.iter().enumerate() {
        plan[i % members].push(Arc::clone(partition));
    }

    plan
}

fn range(partitions: &[Arc<Partition>], members: usize) -> Plan {
    let partitions_per_consumer = partitions.len() / members;
    let consumers_with_extra_partition = partitions.len() % members;

    (0..members)
        .map(|index| {
            let min = index * partitions_per_consumer
                + std::cmp::min(consumers_with_extra_partition, index);
            let extra = if index < consumers_with_extra_partition {
                1
            } else {
                0
            };
            let max = min + partitions_per_consumer + extra;

            partitions[min..max].to_vec()
        })
        .collect()
}

/// Checks that `plan` hands out every partition exactly once.
fn verify(plan: &Plan, members: usize, partitions: &[Arc<Partition>]) -> Result<()> {
    if plan.len() != members {
        return Err(Error::InvalidIndex {
            index: plan.len() as i64,
            len: members,
        });
    }

    let mut seen = BTreeSet::new();
    for partition in plan.iter().flatten() {
        if !seen.insert(partition.id()) {
            return Err(Error::InvalidIndex {
                index: seen.len() as i64,
                len: partitions.len(),
            });
        }
    }

    if seen.len() != partitions.len() || partitions.iter().any(|p| !seen.contains(p.id())) {
        return Err(Error::InvalidIndex {
            index: seen.len() as i64,
            len: partitions.len(),
        });
    }

    Ok(())
}

enum Change {
    Join(Arc<Consumer>),
    /// Position of the leaving member.
    Leave(usize),
}

#[derive(Debug)]
pub struct ConsumerGroup {
    id: String,
    topic: String,
    strategy: Mutex<Rebalance>,
    members: Mutex<Vec<Arc<Consumer>>>,
}

impl ConsumerGroup {
    pub(crate) fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        strategy: Rebalance,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            strategy: Mutex::new(strategy),
            members: Mutex::new(vec![]),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the topic this group consumes.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn strategy(&self) -> Rebalance {
        *self.strategy.lock()
    }

    /// Swaps the strategy. Takes effect on the next rebalance.
    pub fn set_strategy(&self, strategy: Rebalance) {
        *self.strategy.lock() = strategy;
        info!(group = self.id.as_str(), %strategy, "rebalance strategy updated");
    }

    pub fn members(&self) -> Vec<Arc<Consumer>> {
        self.members.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_consumer(&self, consumer_id: &str) -> bool {
        self.members.lock().iter().any(|c| c.id() == consumer_id)
    }

    pub fn consumer(&self, consumer_id: &str) -> Option<Arc<Consumer>> {
        self.members
            .lock()
            .iter()
            .find(|c| c.id() == consumer_id)
            .cloned()
    }

    /// Adds a member and rebalances over `partitions`.
    ///
    /// Ids are not checked here; the broker rejects duplicates before calling.
    pub(crate) fn add_consumer(
        &self,
        consumer_id: &str,
        partitions: &[Arc<Partition>],
    ) -> Result<Arc<Consumer>> {
        let mut members = self.members.lock();
        let consumer = Arc::new(Consumer::new(consumer_id));
        let strategy = self.strategy();
        self.change_membership(
            &mut members,
            Change::Join(Arc::clone(&consumer)),
            partitions,
            |partitions, n| strategy.assign(partitions, n),
        )?;
        info!(
            group = self.id.as_str(),
            consumer = consumer_id,
            members = members.len(),
            "consumer joined",
        );

        Ok(consumer)
    }

    /// Removes a member and rebalances over `partitions`.
    ///
    /// The removed consumer loses its assignment in the same swap that hands
    /// its partitions to the remaining members.
    pub(crate) fn remove_consumer(
        &self,
        consumer_id: &str,
        partitions: &[Arc<Partition>],
    ) -> Result<Arc<Consumer>> {
        let mut members = self.members.lock();
        let position = members
            .iter()
            .position(|c| c.id() == consumer_id)
            .ok_or_else(|| Error::not_found(Entity::Consumer, consumer_id))?;
        let strategy = self.strategy();
        let consumer = self.change_membership(
            &mut members,
            Change::Leave(position),
            partitions,
            |partitions, n| strategy.assign(partitions, n),
        )?;
        info!(
            group = self.id.as_str(),
            consumer = consumer_id,
            members = members.len(),
            "consumer left",
        );

        Ok(consumer)
    }

    /// Recomputes every member's assignment over `partitions`.
    pub fn rebalance(&self, partitions: &[Arc<Partition>]) -> Result<()> {
        let members = self.members.lock();
        let strategy = self.strategy();
        let plan = strategy.assign(partitions, members.len());
        self.swap_assignments(&members, None, partitions, plan)
    }

    /// Applies `change` to `members` and rebalances with the plan built by
    /// `plan_for`. Membership is restored when the plan is rejected.
    ///
    /// Returns the consumer that joined or left.
    fn change_membership<F>(
        &self,
        members: &mut Vec<Arc<Consumer>>,
        change: Change,
        partitions: &[Arc<Partition>],
        plan_for: F,
    ) -> Result<Arc<Consumer>>
    where
        F: FnOnce(&[Arc<Partition>], usize) -> Plan,
    {
        match change {
            Change::Join(consumer) => {
                members.push(Arc::clone(&consumer));
                let plan = plan_for(partitions, members.len());
                if let Err(e) = self.swap_assignments(members, None, partitions, plan) {
                    members.pop();
                    return Err(e);
                }

                Ok(consumer)
            }
            Change::Leave(position) => {
                let consumer = members.remove(position);
                let plan = plan_for(partitions, members.len());
                if let Err(e) = self.swap_assignments(members, Some(&consumer), partitions, plan)
                {
                    members.insert(position, Arc::clone(&consumer));
                    return Err(e);
                }

                Ok(consumer)
            }
        }
    }

    /// Checks `plan` before any assignment is touched, then write-locks every
    /// member's assignment, plus the departing consumer's, and swaps them
    /// together. The departing consumer ends up with no partitions.
    fn swap_assignments(
        &self,
        members: &[Arc<Consumer>],
        departed: Option<&Arc<Consumer>>,
        partitions: &[Arc<Partition>],
        plan: Plan,
    ) -> Result<()> {
        if !members.is_empty() {
            verify(&plan, members.len(), partitions)?;
        }

        let mut guards = members
            .iter()
            .map(|c| c.assignment.write())
            .collect::<Vec<_>>();
        let mut departed = departed.map(|c| c.assignment.write());
        for (guard, assigned) in guards.iter_mut().zip(plan) {
            **guard = assigned;
        }
        if let Some(guard) = departed.as_mut() {
            guard.clear();
        }
        drop(departed);
        drop(guards);

        if members.is_empty() {
            debug!(group = self.id.as_str(), "no members left, nothing assigned");
        } else {
            info!(
                group = self.id.as_str(),
                strategy = %self.strategy(),
                members = members.len(),
                partitions = partitions.len(),
                "rebalanced",
            );
        }

        Ok(())
    }

    pub fn describe(&self) -> GroupDescription {
        GroupDescription {
            id: self.id.clone(),
            topic: self.topic.clone(),
            strategy: self.strategy(),
            members: self
                .members()
                .iter()
                .map(|c| MemberDescription {
                    id: c.id().to_string(),
                    partitions: c.assigned_partitions(),
                    consumed: c.consumed_count(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescription {
    pub id: String,
    pub partitions: Vec<String>,
    pub consumed: usize,
}

/// Point-in-time view of a group, printed by `show consumer group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub id: String,
    pub topic: String,
    pub strategy: Rebalance,
    pub members: Vec<MemberDescription>,
}

impl Display for GroupDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Consumer group '{}' on topic '{}' ({})",
            self.id, self.topic, self.strategy
        )?;
        if self.members.is_empty() {
            return writeln!(f, "  (no consumers)");
        }

        for member in &self.members {
            writeln!(
                f,
                "  consumer '{}': partitions [{}], {} event(s) consumed",
                member.id,
                member.partitions.join(", "),
                member.consumed
            )?;
        }

        Ok(())
    }
}
