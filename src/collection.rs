//! Ordered, mutable list of generated problems.
//!
//! Insertion order is display order is print order. After every structural
//! operation each problem's `number` equals its position + 1.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::Problem;

/// Neighbor to swap with when reordering. Travels as -1 / +1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i8")]
pub enum Direction {
  Up,
  Down,
}

impl TryFrom<i8> for Direction {
  type Error = String;
  fn try_from(n: i8) -> Result<Self, Self::Error> {
    match n {
      -1 => Ok(Direction::Up),
      1 => Ok(Direction::Down),
      other => Err(format!("direction must be -1 or 1, got {}", other)),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DeleteError {
  #[error("problem index out of range")]
  OutOfRange,
  #[error("最低1問は必要です")]
  MinimumRequired,
  #[error("deletion cancelled")]
  Cancelled,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProblemCollection {
  problems: Vec<Problem>,
}

impl ProblemCollection {
  pub fn len(&self) -> usize { self.problems.len() }

  pub fn is_empty(&self) -> bool { self.problems.is_empty() }

  pub fn get(&self, index: usize) -> Option<&Problem> { self.problems.get(index) }

  pub fn as_slice(&self) -> &[Problem] { &self.problems }

  pub fn iter(&self) -> std::slice::Iter<'_, Problem> { self.problems.iter() }

  pub fn clear(&mut self) { self.problems.clear(); }

  /// Replace the whole collection and number it 1..N.
  pub fn replace_all(&mut self, problems: Vec<Problem>) {
    self.problems = problems;
    self.renumber();
  }

  /// In-place question edit. Out-of-range indexes are ignored.
  pub fn update_text(&mut self, index: usize, text: &str) -> bool {
    match self.problems.get_mut(index) {
      Some(p) => {
        p.question = text.to_string();
        true
      }
      None => false,
    }
  }

  /// Swap with the neighbor in `direction`. No-op when that neighbor does not exist.
  pub fn move_by(&mut self, index: usize, direction: Direction) -> bool {
    let target = match direction {
      Direction::Up => index.checked_sub(1),
      Direction::Down => index.checked_add(1),
    };
    let Some(target) = target.filter(|t| *t < self.problems.len()) else {
      return false;
    };
    if index >= self.problems.len() {
      return false;
    }
    self.problems.swap(index, target);
    self.renumber();
    debug!(target: "wizard", from = index, to = target, "Problem moved");
    true
  }

  /// Remove a problem after the caller's confirmation. Refuses to empty the
  /// collection; the size check comes before the prompt.
  pub fn delete(&mut self, index: usize, confirm: impl FnOnce(usize) -> bool) -> Result<Problem, DeleteError> {
    if self.problems.len() <= 1 {
      return Err(DeleteError::MinimumRequired);
    }
    if index >= self.problems.len() {
      return Err(DeleteError::OutOfRange);
    }
    if !confirm(index) {
      return Err(DeleteError::Cancelled);
    }
    let removed = self.problems.remove(index);
    self.renumber();
    debug!(target: "wizard", index, remaining = self.problems.len(), "Problem deleted");
    Ok(removed)
  }

  /// Overwrite one slot after single-item regeneration. The incoming problem
  /// takes the slot's number; the rest is already consistent.
  pub fn replace_one(&mut self, index: usize, mut problem: Problem) -> bool {
    match self.problems.get_mut(index) {
      Some(slot) => {
        problem.number = index as u32 + 1;
        *slot = problem;
        true
      }
      None => false,
    }
  }

  fn renumber(&mut self) {
    for (i, p) in self.problems.iter_mut().enumerate() {
      p.number = i as u32 + 1;
    }
  }

  #[cfg(test)]
  fn numbers_match_positions(&self) -> bool {
    self.problems.iter().enumerate().all(|(i, p)| p.number == i as u32 + 1)
  }
}

impl<'a> IntoIterator for &'a ProblemCollection {
  type Item = &'a Problem;
  type IntoIter = std::slice::Iter<'a, Problem>;
  fn into_iter(self) -> Self::IntoIter { self.problems.iter() }
}
