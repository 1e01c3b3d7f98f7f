use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

pub type ParticipantId = String;

pub const MAX_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ParticipantId>", into = "Vec<ParticipantId>")]
pub struct Roster {
    members: Vec<ParticipantId>,
    lookup: HashSet<ParticipantId>,
}

impl Roster {
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ParticipantId>,
    {
        let mut roster = Self::default();
        for member in members {
            let member = member.into();
            if roster.lookup.insert(member.clone()) {
                roster.members.push(member);
            }
        }
        roster
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains(id)
    }

    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl From<Vec<ParticipantId>> for Roster {
    fn from(members: Vec<ParticipantId>) -> Self {
        Self::new(members)
    }
}

impl From<Roster> for Vec<ParticipantId> {
    fn from(roster: Roster) -> Self {
        roster.members
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Declaration {
    pub receiver: ParticipantId,
    pub purchased: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub giver: ParticipantId,
    pub contact: String,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub giver: ParticipantId,
    pub receiver: ParticipantId,
}

impl Assignment {
    pub fn new(giver: impl Into<ParticipantId>, receiver: impl Into<ParticipantId>) -> Self {
        Self {
            giver: giver.into(),
            receiver: receiver.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownGiver,
    UnknownReceiver,
    SelfAssignment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedDeclaration {
    pub giver: ParticipantId,
    pub receiver: ParticipantId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockPlan {
    pub locked: Vec<Assignment>,
    pub free_givers: Vec<ParticipantId>,
    pub free_receivers: Vec<ParticipantId>,
    pub skipped: Vec<SkippedDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawOutcome {
    pub assignments: Vec<Assignment>,
    pub locked_count: usize,
    pub matched_count: usize,
    pub skipped: Vec<SkippedDeclaration>,
    pub success: bool,
}

impl DrawOutcome {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("Successfully generated {} assignments.", self.len())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error(
        "conflict: more than one person has purchased a gift for {receiver} \
         ({first_giver} and {second_giver}); manual intervention is required"
    )]
    Conflict {
        receiver: ParticipantId,
        first_giver: ParticipantId,
        second_giver: ParticipantId,
    },
    #[error(
        "{giver} has purchased gifts for both {first_receiver} and {second_receiver}; \
         manual intervention is required"
    )]
    GiverLockedTwice {
        giver: ParticipantId,
        first_receiver: ParticipantId,
        second_receiver: ParticipantId,
    },
    #[error("failed to find a derangement without self-pairing after {attempts} attempts")]
    NoValidMatching { attempts: usize },
    #[error("cannot match {givers} free givers against {receivers} free receivers")]
    UnbalancedPools { givers: usize, receivers: usize },
}

impl AssignmentError {
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(
            self,
            AssignmentError::Conflict { .. } | AssignmentError::GiverLockedTwice { .. }
        )
    }
}

pub fn resolve_assignments<R: Rng + ?Sized>(
    roster: &Roster,
    submissions: &[SubmissionRecord],
    rng: &mut R,
) -> Result<DrawOutcome, AssignmentError> {
    let plan = resolve_locks(roster, submissions)?;
    let matched = derange(&plan.free_givers, &plan.free_receivers, rng)?;
    Ok(assemble(roster, plan, matched))
}

pub fn resolve_locks(
    roster: &Roster,
    submissions: &[SubmissionRecord],
) -> Result<LockPlan, AssignmentError> {
    let mut locked = Vec::new();
    let mut skipped = Vec::new();
    // giver -> receiver and receiver -> giver over accepted locks
    let mut receiver_of: HashMap<&str, &str> = HashMap::new();
    let mut giver_for: HashMap<&str, &str> = HashMap::new();

    for submission in submissions {
        let giver = submission.giver.as_str();
        for declaration in submission.declarations.iter().filter(|d| d.purchased) {
            let receiver = declaration.receiver.as_str();
            if receiver.trim().is_empty() {
                continue;
            }

            let reason = if !roster.contains(giver) {
                Some(SkipReason::UnknownGiver)
            } else if !roster.contains(receiver) {
                Some(SkipReason::UnknownReceiver)
            } else if giver == receiver {
                Some(SkipReason::SelfAssignment)
            } else {
                None
            };
            if let Some(reason) = reason {
                skipped.push(SkippedDeclaration {
                    giver: giver.to_string(),
                    receiver: receiver.to_string(),
                    reason,
                });
                continue;
            }

            if let Some(&first_giver) = giver_for.get(receiver) {
                if first_giver == giver {
                    continue;
                }
                return Err(AssignmentError::Conflict {
                    receiver: receiver.to_string(),
                    first_giver: first_giver.to_string(),
                    second_giver: giver.to_string(),
                });
            }

            if let Some(&first_receiver) = receiver_of.get(giver) {
                return Err(AssignmentError::GiverLockedTwice {
                    giver: giver.to_string(),
                    first_receiver: first_receiver.to_string(),
                    second_receiver: receiver.to_string(),
                });
            }

            receiver_of.insert(giver, receiver);
            giver_for.insert(receiver, giver);
            locked.push(Assignment::new(giver, receiver));
        }
    }

    let free_givers = roster
        .members()
        .iter()
        .filter(|id| !receiver_of.contains_key(id.as_str()))
        .cloned()
        .collect();
    let free_receivers = roster
        .members()
        .iter()
        .filter(|id| !giver_for.contains_key(id.as_str()))
        .cloned()
        .collect();

    Ok(LockPlan {
        locked,
        free_givers,
        free_receivers,
        skipped,
    })
}

// Each trial shuffles both pools and walks them left to right; a self-pairing
// at `i` is repaired by swapping `receivers[i]` with `receivers[i + 1]`, and a
// self-pairing on the last slot abandons the trial.
pub fn derange<R: Rng + ?Sized>(
    givers: &[ParticipantId],
    receivers: &[ParticipantId],
    rng: &mut R,
) -> Result<Vec<Assignment>, AssignmentError> {
    if givers.len() != receivers.len() {
        return Err(AssignmentError::UnbalancedPools {
            givers: givers.len(),
            receivers: receivers.len(),
        });
    }
    if givers.is_empty() {
        return Ok(Vec::new());
    }

    for attempt in 1..=MAX_ATTEMPTS {
        let mut shuffled_givers = givers.to_vec();
        shuffled_givers.shuffle(rng);
        let mut shuffled_receivers = receivers.to_vec();
        shuffled_receivers.shuffle(rng);

        if repair_self_pairings(&shuffled_givers, &mut shuffled_receivers) {
            debug!(attempt, pairs = givers.len(), "derangement found");
            return Ok(shuffled_givers
                .into_iter()
                .zip(shuffled_receivers)
                .map(|(giver, receiver)| Assignment { giver, receiver })
                .collect());
        }
        debug!(attempt, "trial abandoned, last giver drew themselves");
    }

    Err(AssignmentError::NoValidMatching {
        attempts: MAX_ATTEMPTS,
    })
}

fn repair_self_pairings(givers: &[ParticipantId], receivers: &mut [ParticipantId]) -> bool {
    let last = givers.len() - 1;
    for i in 0..givers.len() {
        if givers[i] == receivers[i] {
            if i == last {
                return false;
            }
            receivers.swap(i, i + 1);
        }
    }
    true
}

pub fn assemble(roster: &Roster, plan: LockPlan, matched: Vec<Assignment>) -> DrawOutcome {
    let locked_count = plan.locked.len();
    let matched_count = matched.len();
    let mut assignments = plan.locked;
    assignments.extend(matched);
    let success = is_perfect_derangement(roster, &assignments);

    DrawOutcome {
        assignments,
        locked_count,
        matched_count,
        skipped: plan.skipped,
        success,
    }
}

pub fn is_perfect_derangement(roster: &Roster, assignments: &[Assignment]) -> bool {
    if assignments.len() != roster.len() {
        return false;
    }

    let mut givers: HashSet<&str> = HashSet::new();
    let mut receivers: HashSet<&str> = HashSet::new();
    assignments.iter().all(|a| {
        a.giver != a.receiver
            && roster.contains(&a.giver)
            && roster.contains(&a.receiver)
            && givers.insert(&a.giver)
            && receivers.insert(&a.receiver)
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDirectory {
    contacts: HashMap<ParticipantId, String>,
}

impl ContactDirectory {
    pub fn from_submissions(submissions: &[SubmissionRecord]) -> Self {
        let contacts = submissions
            .iter()
            .filter(|s| !s.contact.trim().is_empty())
            .map(|s| (s.giver.clone(), s.contact.trim().to_string()))
            .collect();
        Self { contacts }
    }

    pub fn contact_for(&self, giver: &str) -> Option<&str> {
        self.contacts.get(giver).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
