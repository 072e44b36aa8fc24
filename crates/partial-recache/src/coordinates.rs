use std::{collections::HashMap, sync::Arc};

use crate::document::OperationKind;

/// Tracks the coordinate of the field being visited during a depth first walk.
///
/// Coordinates are dotted paths of response keys, rooted at the operation kind
/// (`Query.dashboard.topActivity`) or at the fragment name.
#[derive(Default)]
pub struct CoordinateTracker {
    stack: Vec<String>,
    segments: SegmentCache,
}

impl CoordinateTracker {
    pub fn enter_operation(&mut self, kind: OperationKind) {
        self.enter_root(kind.root_coordinate());
    }

    pub fn enter_root(&mut self, root: &str) {
        self.stack.clear();
        self.stack.push(root.to_string());
    }

    pub fn enter_field(&mut self, response_key: &str) {
        let coordinates = match self.stack.last() {
            Some(parent) => format!("{parent}.{response_key}"),
            None => response_key.to_string(),
        };
        self.stack.push(coordinates);
    }

    pub fn leave_field(&mut self) {
        self.stack.pop();
    }

    pub fn current(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or_default()
    }

    pub fn current_segments(&mut self) -> Arc<[String]> {
        let current = self.stack.last().cloned().unwrap_or_default();
        self.segments.get(&current)
    }
}

/// Splits coordinates into their segments, remembering every split it did.
#[derive(Default)]
pub struct SegmentCache(HashMap<String, Arc<[String]>>);

impl SegmentCache {
    pub fn get(&mut self, coordinates: &str) -> Arc<[String]> {
        if let Some(segments) = self.0.get(coordinates) {
            return Arc::clone(segments);
        }
        let segments: Arc<[String]> = coordinates
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        self.0.insert(coordinates.to_string(), Arc::clone(&segments));
        segments
    }
}
