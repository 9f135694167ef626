//! Testing utilities for the instruction workspace
//!
//! [`FakeHost`] is an in-memory CAD host: it hands out handles, keeps element
//! geometry and attributes, records every call, and fails on demand.

#![allow(missing_docs)]

use glam::DVec3;
use instr_core::{
    AnchorPoint, DimensionInstruction, ElementHandle, EngineConfig, Frame, HostApi,
    HostCapabilities, HostError, Instruction, InstructionRenderer, ModelInstruction, Point,
    ProjectDataStore, RawDimension, Registry, TextInstruction, TextOptions, Vector,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    CreateText,
    CreateDimension,
    ImportModel,
    ApplyTransform,
    Move,
    Delete,
    Recreate,
    Refresh,
    BoundingBox,
    SetAttribute,
    GetAttribute,
    RemoveAttribute,
    ListElements,
    DimensionData,
    SetProjectData,
    GetProjectData,
}

impl HostOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HostOp::CreateText => "create_text",
            HostOp::CreateDimension => "create_dimension",
            HostOp::ImportModel => "import_light_model",
            HostOp::ApplyTransform => "apply_transform",
            HostOp::Move => "move_elements",
            HostOp::Delete => "delete",
            HostOp::Recreate => "recreate",
            HostOp::Refresh => "refresh",
            HostOp::BoundingBox => "bounding_box_local",
            HostOp::SetAttribute => "set_attribute",
            HostOp::GetAttribute => "get_attribute",
            HostOp::RemoveAttribute => "remove_attribute",
            HostOp::ListElements => "list_element_ids",
            HostOp::DimensionData => "dimension_data",
            HostOp::SetProjectData => "set_project_data",
            HostOp::GetProjectData => "get_project_data",
        }
    }
}

/// One recorded host call
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    CreateText { origin: Point, text: String },
    CreateDimension { direction: Vector, anchors: Vec<Point> },
    ImportModel { path: PathBuf, origin: Point },
    ApplyTransform { handles: Vec<ElementHandle> },
    Move { handles: Vec<ElementHandle>, translation: Vector },
    Delete { handles: Vec<ElementHandle> },
    Recreate { handles: Vec<ElementHandle> },
    Refresh,
    BoundingBox { handle: ElementHandle },
    SetAttribute { handles: Vec<ElementHandle>, key: u32, value: String },
    GetAttribute { handle: ElementHandle, key: u32 },
    RemoveAttribute { handles: Vec<ElementHandle>, key: u32 },
    ListElements,
    DimensionData { handle: ElementHandle },
    SetProjectData { key: String },
    GetProjectData { key: String },
}

impl HostCall {
    #[must_use]
    pub fn op(&self) -> HostOp {
        match self {
            HostCall::CreateText { .. } => HostOp::CreateText,
            HostCall::CreateDimension { .. } => HostOp::CreateDimension,
            HostCall::ImportModel { .. } => HostOp::ImportModel,
            HostCall::ApplyTransform { .. } => HostOp::ApplyTransform,
            HostCall::Move { .. } => HostOp::Move,
            HostCall::Delete { .. } => HostOp::Delete,
            HostCall::Recreate { .. } => HostOp::Recreate,
            HostCall::Refresh => HostOp::Refresh,
            HostCall::BoundingBox { .. } => HostOp::BoundingBox,
            HostCall::SetAttribute { .. } => HostOp::SetAttribute,
            HostCall::GetAttribute { .. } => HostOp::GetAttribute,
            HostCall::RemoveAttribute { .. } => HostOp::RemoveAttribute,
            HostCall::ListElements => HostOp::ListElements,
            HostCall::DimensionData { .. } => HostOp::DimensionData,
            HostCall::SetProjectData { .. } => HostOp::SetProjectData,
            HostCall::GetProjectData { .. } => HostOp::GetProjectData,
        }
    }
}

/// What kind of element the fake holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeKind {
    Text,
    Dimension,
    Model,
    /// Created outside this system
    External,
}

#[derive(Debug, Clone)]
struct FakeElement {
    kind: FakeKind,
    origin: Point,
    corners: Vec<Point>,
    attributes: BTreeMap<u32, String>,
    dimension: Option<RawDimension>,
}

impl FakeElement {
    fn new(kind: FakeKind, origin: Point) -> Self {
        Self {
            kind,
            origin,
            corners: Vec::new(),
            attributes: BTreeMap::new(),
            dimension: None,
        }
    }
}

#[derive(Debug)]
struct FakeState {
    next_id: u64,
    elements: BTreeMap<ElementHandle, FakeElement>,
    calls: Vec<HostCall>,
    fail_once: HashMap<HostOp, usize>,
    fail_always: HashSet<HostOp>,
    undeletable: BTreeSet<ElementHandle>,
    project_data: BTreeMap<String, String>,
    text_extent: Option<(f64, f64)>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            next_id: 1,
            elements: BTreeMap::new(),
            calls: Vec::new(),
            fail_once: HashMap::new(),
            fail_always: HashSet::new(),
            undeletable: BTreeSet::new(),
            project_data: BTreeMap::new(),
            text_extent: None,
        }
    }
}

impl FakeState {
    fn record(&mut self, call: HostCall) -> Result<(), HostError> {
        let op = call.op();
        self.calls.push(call);
        if self.fail_always.contains(&op) {
            return Err(HostError::call(op.as_str(), "injected failure"));
        }
        if let Some(remaining) = self.fail_once.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HostError::call(op.as_str(), "injected failure"));
            }
        }
        Ok(())
    }

    fn allocate(&mut self, element: FakeElement) -> ElementHandle {
        let handle = ElementHandle::new(self.next_id);
        self.next_id += 1;
        self.elements.insert(handle, element);
        handle
    }

    fn element_mut(
        &mut self,
        op: HostOp,
        handle: ElementHandle,
    ) -> Result<&mut FakeElement, HostError> {
        self.elements
            .get_mut(&handle)
            .ok_or_else(|| HostError::call(op.as_str(), format!("unknown element {handle}")))
    }
}

/// In-memory host
#[derive(Debug, Default)]
pub struct FakeHost {
    capabilities: HostCapabilities,
    state: Mutex<FakeState>,
}

impl FakeHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::default(),
        }
    }

    /// Add an element as if another tool had drawn it
    pub fn add_external(&self) -> ElementHandle {
        self.state
            .lock()
            .allocate(FakeElement::new(FakeKind::External, DVec3::ZERO))
    }

    /// Add an element under a chosen handle
    pub fn insert_element(&self, handle: ElementHandle) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(handle.raw() + 1);
        state
            .elements
            .insert(handle, FakeElement::new(FakeKind::External, DVec3::ZERO));
    }

    /// Add a dimension element carrying `raw` as its stored data
    pub fn insert_dimension(&self, raw: RawDimension) -> ElementHandle {
        let origin = raw.points.first().copied().unwrap_or_default();
        let mut element = FakeElement::new(FakeKind::Dimension, origin);
        element.corners.clone_from(&raw.points);
        element.dimension = Some(raw);
        self.state.lock().allocate(element)
    }

    /// Remove an element behind the session's back
    pub fn remove_external(&self, handle: ElementHandle) -> bool {
        self.state.lock().elements.remove(&handle).is_some()
    }

    /// Make the next `op` call fail
    pub fn fail_next(&self, op: HostOp) {
        *self.state.lock().fail_once.entry(op).or_insert(0) += 1;
    }

    /// Make every `op` call fail until [`FakeHost::clear_failures`]
    pub fn fail_always(&self, op: HostOp) {
        self.state.lock().fail_always.insert(op);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_once.clear();
        state.fail_always.clear();
    }

    /// Batch deletes including `handle` report it as failed
    pub fn set_undeletable(&self, handle: ElementHandle, undeletable: bool) {
        let mut state = self.state.lock();
        if undeletable {
            state.undeletable.insert(handle);
        } else {
            state.undeletable.remove(&handle);
        }
    }

    /// Fixed width and height for every text created from now on
    pub fn set_text_extent(&self, width: f64, height: f64) {
        self.state.lock().text_extent = Some((width, height));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    /// Drain the call log
    pub fn take_calls(&self) -> Vec<HostCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    #[must_use]
    pub fn calls_of(&self, op: HostOp) -> Vec<HostCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.state.lock().elements.len()
    }

    #[must_use]
    pub fn contains(&self, handle: ElementHandle) -> bool {
        self.state.lock().elements.contains_key(&handle)
    }

    #[must_use]
    pub fn kind_of(&self, handle: ElementHandle) -> Option<FakeKind> {
        self.state.lock().elements.get(&handle).map(|e| e.kind)
    }

    #[must_use]
    pub fn origin_of(&self, handle: ElementHandle) -> Option<Point> {
        self.state.lock().elements.get(&handle).map(|e| e.origin)
    }

    /// Attribute value without recording a call
    #[must_use]
    pub fn attribute(&self, handle: ElementHandle, key: u32) -> Option<String> {
        self.state
            .lock()
            .elements
            .get(&handle)
            .and_then(|e| e.attributes.get(&key).cloned())
    }

    /// Elements carrying a non-empty value under `key`
    #[must_use]
    pub fn tagged_elements(&self, key: u32) -> Vec<ElementHandle> {
        self.state
            .lock()
            .elements
            .iter()
            .filter(|(_, e)| e.attributes.get(&key).is_some_and(|v| !v.is_empty()))
            .map(|(h, _)| *h)
            .collect()
    }

    #[must_use]
    pub fn project_value(&self, key: &str) -> Option<String> {
        self.state.lock().project_data.get(key).cloned()
    }
}

/// Text box corners in the host's volume ordering: 5->6 spans the width,
/// 6->3 spans the height
fn text_corners(frame: &Frame, width: f64, height: f64, thickness: f64) -> Vec<Point> {
    [
        (0.0, 0.0, thickness),
        (width, 0.0, thickness),
        (width, height, thickness),
        (width, height, 0.0),
        (0.0, height, 0.0),
        (0.0, 0.0, 0.0),
        (width, 0.0, 0.0),
        (0.0, height, thickness),
    ]
    .into_iter()
    .map(|(x, y, z)| frame.origin() + frame.to_world_vector(DVec3::new(x, y, z)))
    .collect()
}

impl HostApi for FakeHost {
    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn create_text(
        &self,
        origin: Point,
        xaxis: Vector,
        yaxis: Vector,
        options: &TextOptions,
    ) -> Result<ElementHandle, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::CreateText {
            origin,
            text: options.text.clone(),
        })?;
        let frame = Frame::new(origin, xaxis, yaxis)
            .map_err(|e| HostError::call(HostOp::CreateText.as_str(), e.to_string()))?;

        #[allow(clippy::cast_precision_loss)]
        let (width, height) = state.text_extent.unwrap_or_else(|| {
            let chars = options.text.chars().count().max(1);
            (chars as f64 * options.height, options.height)
        });
        let mut element = FakeElement::new(FakeKind::Text, origin);
        element.corners = text_corners(&frame, width, height, options.thickness);
        Ok(state.allocate(element))
    }

    fn create_dimension(
        &self,
        direction: Vector,
        text_plane_normal: Vector,
        text_plane_origin: Point,
        anchor_points: &[Point],
    ) -> Result<ElementHandle, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::CreateDimension {
            direction,
            anchors: anchor_points.to_vec(),
        })?;
        let mut element = FakeElement::new(FakeKind::Dimension, text_plane_origin);
        element.corners = anchor_points.to_vec();
        element.dimension = Some(RawDimension {
            points: anchor_points.to_vec(),
            distances: vec![0.0; anchor_points.len()],
            directions: vec![DVec3::ZERO; anchor_points.len()],
            plane_normal: text_plane_normal,
            plane_xaxis: direction,
        });
        Ok(state.allocate(element))
    }

    fn import_light_model(&self, path: &Path, origin: Point) -> Result<ElementHandle, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::ImportModel {
            path: path.to_path_buf(),
            origin,
        })?;
        let mut element = FakeElement::new(FakeKind::Model, origin);
        element.corners = vec![origin];
        Ok(state.allocate(element))
    }

    fn apply_transform(
        &self,
        handles: &[ElementHandle],
        from: &Frame,
        to: &Frame,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::ApplyTransform {
            handles: handles.to_vec(),
        })?;
        for handle in handles {
            let element = state.element_mut(HostOp::ApplyTransform, *handle)?;
            element.origin = from.transfer_point(element.origin, to);
            for corner in &mut element.corners {
                *corner = from.transfer_point(*corner, to);
            }
        }
        Ok(())
    }

    fn move_elements(
        &self,
        handles: &[ElementHandle],
        translation: Vector,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::Move {
            handles: handles.to_vec(),
            translation,
        })?;
        for handle in handles {
            let element = state.element_mut(HostOp::Move, *handle)?;
            element.origin += translation;
            for corner in &mut element.corners {
                *corner += translation;
            }
        }
        Ok(())
    }

    fn delete(&self, handles: &[ElementHandle]) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::Delete {
            handles: handles.to_vec(),
        })?;
        let mut failed = Vec::new();
        for handle in handles {
            if state.undeletable.contains(handle) {
                failed.push(*handle);
            } else {
                state.elements.remove(handle);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(HostError::Partial {
                op: HostOp::Delete.as_str(),
                failed,
            })
        }
    }

    fn recreate(&self, handles: &[ElementHandle]) -> Result<(), HostError> {
        self.state.lock().record(HostCall::Recreate {
            handles: handles.to_vec(),
        })
    }

    fn refresh(&self) {
        self.state.lock().calls.push(HostCall::Refresh);
    }

    fn bounding_box_local(
        &self,
        handle: ElementHandle,
        _relative_to: &[ElementHandle],
    ) -> Result<Vec<Point>, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::BoundingBox { handle })?;
        Ok(state.element_mut(HostOp::BoundingBox, handle)?.corners.clone())
    }

    fn set_attribute(
        &self,
        handles: &[ElementHandle],
        key: u32,
        value: &str,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::SetAttribute {
            handles: handles.to_vec(),
            key,
            value: value.to_string(),
        })?;
        for handle in handles {
            state
                .element_mut(HostOp::SetAttribute, *handle)?
                .attributes
                .insert(key, value.to_string());
        }
        Ok(())
    }

    fn get_attribute(&self, handle: ElementHandle, key: u32) -> Result<Option<String>, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::GetAttribute { handle, key })?;
        Ok(state
            .element_mut(HostOp::GetAttribute, handle)?
            .attributes
            .get(&key)
            .cloned())
    }

    fn remove_attribute(&self, handles: &[ElementHandle], key: u32) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::RemoveAttribute {
            handles: handles.to_vec(),
            key,
        })?;
        if !self.capabilities.supports_attribute_removal {
            return Err(HostError::call(
                HostOp::RemoveAttribute.as_str(),
                "not supported by this host",
            ));
        }
        for handle in handles {
            state
                .element_mut(HostOp::RemoveAttribute, *handle)?
                .attributes
                .remove(&key);
        }
        Ok(())
    }

    fn list_element_ids(&self) -> Result<BTreeSet<ElementHandle>, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::ListElements)?;
        Ok(state.elements.keys().copied().collect())
    }

    fn dimension_data(&self, handle: ElementHandle) -> Result<RawDimension, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::DimensionData { handle })?;
        state
            .element_mut(HostOp::DimensionData, handle)?
            .dimension
            .clone()
            .ok_or_else(|| {
                HostError::call(
                    HostOp::DimensionData.as_str(),
                    format!("{handle} is not a dimension"),
                )
            })
    }
}

impl ProjectDataStore for FakeHost {
    fn set_project_data(&self, key: &str, value: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::SetProjectData {
            key: key.to_string(),
        })?;
        state.project_data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_project_data(&self, key: &str) -> Result<Option<String>, HostError> {
        let mut state = self.state.lock();
        state.record(HostCall::GetProjectData {
            key: key.to_string(),
        })?;
        Ok(state.project_data.get(key).cloned())
    }
}

/// Fake host with a registry and renderer wired to it
#[derive(Debug)]
pub struct TestSession {
    pub host: Arc<FakeHost>,
    pub registry: Arc<Registry>,
    pub renderer: InstructionRenderer,
}

#[must_use]
pub fn setup_session(config: EngineConfig) -> TestSession {
    setup_session_on(Arc::new(FakeHost::new()), config)
}

#[must_use]
pub fn setup_session_on(host: Arc<FakeHost>, config: EngineConfig) -> TestSession {
    let dyn_host: Arc<dyn HostApi> = host.clone();
    let registry = Arc::new(Registry::new(dyn_host.clone()));
    let renderer = InstructionRenderer::new(dyn_host, registry.clone(), config);
    TestSession {
        host,
        registry,
        renderer,
    }
}

pub fn create_text_instruction(text: &str) -> Instruction {
    TextInstruction::new(text, Frame::world_xy()).into()
}

/// Two-anchor dimension of `length` along world x, lying on its measurement line
pub fn create_dimension_instruction(length: f64) -> Instruction {
    DimensionInstruction::new(
        vec![
            AnchorPoint::on_line(DVec3::ZERO),
            AnchorPoint::on_line(DVec3::new(length, 0.0, 0.0)),
        ],
        Frame::world_xy(),
    )
    .into()
}

pub fn create_model_instruction(path: &str, target_origin: Point) -> Instruction {
    ModelInstruction::new(
        path,
        Frame::world_xy(),
        Frame::world_xy().with_origin(target_origin),
    )
    .into()
}
