#![forbid(unsafe_code)]

//! Structural paths into a JSON-LD graph.
//!
//! A [`Path`] is a sequence of map keys and list indices. Lookups never
//! panic: a missing step yields `None`, a step that meets the wrong kind of
//! container yields [`PathError::ContainerMismatch`].

use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    fn expected_container(&self) -> ContainerKind {
        match self {
            Self::Key(_) => ContainerKind::Map,
            Self::Index(_) => ContainerKind::List,
        }
    }

    fn empty_container(&self) -> Value {
        match self {
            Self::Key(_) => Value::Object(Map::new()),
            Self::Index(_) => Value::Array(Vec::new()),
        }
    }
}

impl From<&str> for PathStep {
    fn from(value: &str) -> Self {
        Self::Key(value.to_string())
    }
}

impl From<String> for PathStep {
    fn from(value: String) -> Self {
        Self::Key(value)
    }
}

impl From<usize> for PathStep {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathStep>);

impl Path {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, step: impl Into<PathStep>) -> Self {
        let mut steps = self.0.clone();
        steps.push(step.into());
        Self(steps)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

/// Builds a [`Path`] from keys and indices: `path!["@graph", 0, "@id"]`.
#[macro_export]
macro_rules! path {
    ($($step:expr),* $(,)?) => {
        $crate::path::Path::new(vec![$($crate::path::PathStep::from($step)),*])
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Map,
    List,
    Scalar,
}

impl ContainerKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Map,
            Value::Array(_) => Self::List,
            _ => Self::Scalar,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::List => "list",
            Self::Scalar => "scalar",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("container mismatch at step {position} ({step}): expected {expected}, found {found}")]
    ContainerMismatch {
        position: usize,
        step: PathStep,
        expected: ContainerKind,
        found: ContainerKind,
    },
}

fn mismatch(position: usize, step: &PathStep, found: &Value) -> PathError {
    PathError::ContainerMismatch {
        position,
        step: step.clone(),
        expected: step.expected_container(),
        found: ContainerKind::of(found),
    }
}

pub fn try_get<'a>(root: &'a Value, path: &Path) -> Result<Option<&'a Value>, PathError> {
    let mut current = root;
    for (position, step) in path.steps().iter().enumerate() {
        let next = match (step, current) {
            (_, Value::Null) => None,
            (PathStep::Key(key), Value::Object(map)) => map.get(key),
            (PathStep::Index(index), Value::Array(list)) => list.get(*index),
            (step, other) => return Err(mismatch(position, step, other)),
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Like [`try_get`], but a container mismatch is logged and reported as absent.
pub fn get<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    match try_get(root, path) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(path = %path, "path lookup failed: {err}");
            None
        }
    }
}

pub fn try_get_mut<'a>(root: &'a mut Value, path: &Path) -> Result<Option<&'a mut Value>, PathError> {
    let mut current = root;
    for (position, step) in path.steps().iter().enumerate() {
        let next = match (step, current) {
            (_, Value::Null) => None,
            (PathStep::Key(key), Value::Object(map)) => map.get_mut(key),
            (PathStep::Index(index), Value::Array(list)) => list.get_mut(*index),
            (step, other) => return Err(mismatch(position, step, other)),
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Writes `leaf` at `path`, creating missing intermediate containers.
///
/// The kind of a created container follows the step that will index into
/// it: an index step creates a list (padded with `null`), a key step a map.
/// An existing intermediate of the wrong kind is left untouched and reported.
pub fn set(root: &mut Value, path: &Path, leaf: Value) -> Result<(), PathError> {
    let steps = path.steps();
    let Some((last, init)) = steps.split_last() else {
        *root = leaf;
        return Ok(());
    };

    let mut current = root;
    for (position, step) in init.iter().enumerate() {
        current = child_or_create(current, position, step, &steps[position + 1])?;
    }

    if current.is_null() {
        *current = last.empty_container();
    }
    match (last, current) {
        (PathStep::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), leaf);
            Ok(())
        }
        (PathStep::Index(index), Value::Array(list)) => {
            if list.len() <= *index {
                list.resize(*index + 1, Value::Null);
            }
            list[*index] = leaf;
            Ok(())
        }
        (step, other) => Err(mismatch(steps.len() - 1, step, other)),
    }
}

fn child_or_create<'a>(
    current: &'a mut Value,
    position: usize,
    step: &PathStep,
    next: &PathStep,
) -> Result<&'a mut Value, PathError> {
    if current.is_null() {
        *current = step.empty_container();
    }
    match (step, current) {
        (PathStep::Key(key), Value::Object(map)) => Ok(map
            .entry(key.clone())
            .or_insert_with(|| next.empty_container())),
        (PathStep::Index(index), Value::Array(list)) => {
            if list.len() <= *index {
                list.resize(*index + 1, Value::Null);
            }
            Ok(&mut list[*index])
        }
        (step, other) => Err(mismatch(position, step, other)),
    }
}

/// Removes the value at `path`; list entries are removed, shifting later ones.
pub fn remove(root: &mut Value, path: &Path) -> Result<Option<Value>, PathError> {
    let Some((last, init)) = path.steps().split_last() else {
        return Ok(None);
    };
    let parent_path = Path::new(init.to_vec());
    let Some(parent) = try_get_mut(root, &parent_path)? else {
        return Ok(None);
    };
    match (last, parent) {
        (PathStep::Key(key), Value::Object(map)) => Ok(map.remove(key)),
        (PathStep::Index(index), Value::Array(list)) => {
            if *index < list.len() {
                Ok(Some(list.remove(*index)))
            } else {
                Ok(None)
            }
        }
        (step, other) => Err(mismatch(init.len(), step, other)),
    }
}

#[cfg(test)]
mod tests;
