//! Job and instruction model.
//!
//! A job is a tree of instructions. Conditions nest `then`/`else` branches
//! (tree addressing), or, in the legacy flat form, carry a `flowAction` jump
//! into the top-level list. All traversal here uses explicit stacks so that
//! deeply nested input cannot exhaust the call stack.

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::FlowError;
use crate::predicate::Predicate;
use crate::retry::RetryPolicy;

/// A named, ordered program of instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub name: String,
    /// Page loaded before the first instruction; empty means "stay on the current page"
    #[serde(default)]
    pub start_url: String,
    pub instructions: Vec<Instruction>,
    /// Declared addressing mode; inferred from the instructions when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addressing: Option<AddressingMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddressingMode {
    /// Nested `then`/`else` branches
    Tree,
    /// Top-level list with jump targets
    Flat,
}

impl AddressingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressingMode::Tree => "tree",
            AddressingMode::Flat => "flat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Instruction {
    Step(Step),
    Condition(Condition),
    /// Reserved; recorded as unsupported when reached
    AiAction(AiAction),
}

impl Instruction {
    pub fn id(&self) -> Option<&str> {
        match self {
            Instruction::Step(step) => step.id.as_deref(),
            Instruction::Condition(condition) => condition.id.as_deref(),
            Instruction::AiAction(action) => action.id.as_deref(),
        }
    }

    /// Short label used in records and logs, e.g. `step:fillInput`.
    pub fn kind_label(&self) -> String {
        match self {
            Instruction::Step(step) => format!("step:{}", step.kind.as_str()),
            Instruction::Condition(_) => "condition".to_string(),
            Instruction::AiAction(_) => "aiAction".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    PressButton,
    FillInput,
    Redirect,
    ReadValue,
    ElementExists,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::PressButton => "pressButton",
            StepKind::FillInput => "fillInput",
            StepKind::Redirect => "redirect",
            StepKind::ReadValue => "readValue",
            StepKind::ElementExists => "elementExists",
        }
    }

    fn requires_target(&self) -> bool {
        !matches!(self, StepKind::Redirect)
    }
}

/// A leaf page action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: StepKind,
    /// CSS selector of the element acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_query: Option<ValueQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_element_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_navigation_timeout_ms: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub wait_for_navigation: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub press_enter_after_fill: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delay_before_enter_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<Capture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            id: None,
            kind,
            target: None,
            url: None,
            value_query: None,
            wait_for_element_timeout_ms: None,
            wait_for_navigation_timeout_ms: None,
            wait_for_navigation: false,
            press_enter_after_fill: false,
            delay_before_enter_ms: 0,
            capture: None,
            retry: None,
        }
    }

    pub fn press_button(target: impl Into<String>) -> Self {
        Self::new(StepKind::PressButton).with_target(target)
    }

    pub fn fill_input(target: impl Into<String>, value: ValueQuery) -> Self {
        Self::new(StepKind::FillInput)
            .with_target(target)
            .with_value(value)
    }

    pub fn redirect(url: impl Into<String>) -> Self {
        let mut step = Self::new(StepKind::Redirect);
        step.url = Some(url.into());
        step
    }

    pub fn read_value(target: impl Into<String>) -> Self {
        Self::new(StepKind::ReadValue).with_target(target)
    }

    pub fn element_exists(target: impl Into<String>) -> Self {
        Self::new(StepKind::ElementExists).with_target(target)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: ValueQuery) -> Self {
        self.value_query = Some(value);
        self
    }

    pub fn with_element_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_for_element_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_navigation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_for_navigation_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn waiting_for_navigation(mut self) -> Self {
        self.wait_for_navigation = true;
        self
    }

    pub fn pressing_enter(mut self, delay_ms: u64) -> Self {
        self.press_enter_after_fill = true;
        self.delay_before_enter_ms = delay_ms;
        self
    }

    pub fn capture_as(mut self, name: impl Into<String>, scope: CaptureScope) -> Self {
        self.capture = Some(Capture {
            name: Some(name.into()),
            scope,
        });
        self
    }

    /// Append the output to the global log without a name.
    pub fn capturing_unnamed(mut self) -> Self {
        self.capture = Some(Capture {
            name: None,
            scope: CaptureScope::Global,
        });
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    fn validate(&self, position: &str) -> Result<(), FlowError> {
        let invalid = |reason: &str| FlowError::InvalidStructure {
            position: position.to_string(),
            reason: reason.to_string(),
        };

        let has_target = self
            .target
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);

        if self.kind == StepKind::Redirect {
            if self.target.is_some() {
                return Err(invalid("redirect steps must not carry a target"));
            }
            let has_url = self
                .url
                .as_deref()
                .map(|u| !u.trim().is_empty())
                .unwrap_or(false);
            if !has_url && self.value_query.is_none() {
                return Err(invalid("redirect steps need a url or a valueQuery"));
            }
        } else if self.kind.requires_target() && !has_target {
            return Err(invalid(&format!(
                "{} steps need a target selector",
                self.kind.as_str()
            )));
        }

        if self.kind == StepKind::FillInput && self.value_query.is_none() {
            return Err(invalid("fillInput steps need a valueQuery"));
        }

        if let Some(capture) = &self.capture {
            if capture.scope == CaptureScope::Local && capture.name.is_none() {
                return Err(invalid("local captures need a name"));
            }
        }

        if let Some(retry) = &self.retry {
            if retry.max_attempts == 0 {
                return Err(invalid("retry.maxAttempts must be at least 1"));
            }
        }

        Ok(())
    }
}

/// Authoring tools emit explicit `null` for unset flags.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Where a step's output is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    /// Unnamed global captures are addressable by index only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub scope: CaptureScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureScope {
    #[default]
    Global,
    Local,
}

/// Source of a value used by a step or a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueQuery {
    Literal(String),
    /// Most recent global return value with this name
    ReturnValue(String),
    /// Global return value by capture order
    ReturnIndex(usize),
    /// Local scratch variable
    Variable(String),
}

/// Branching instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub predicate: Predicate,
    #[serde(default, rename = "then", skip_serializing_if = "Vec::is_empty")]
    pub then_branch: Vec<Instruction>,
    #[serde(default, rename = "else", skip_serializing_if = "Vec::is_empty")]
    pub else_branch: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_action: Option<FlowAction>,
}

impl Condition {
    pub fn branch(
        predicate: Predicate,
        then_branch: Vec<Instruction>,
        else_branch: Vec<Instruction>,
    ) -> Self {
        Self {
            id: None,
            predicate,
            then_branch,
            else_branch,
            flow_action: None,
        }
    }

    pub fn jump(predicate: Predicate, target_index: usize) -> Self {
        Self {
            id: None,
            predicate,
            then_branch: Vec::new(),
            else_branch: Vec::new(),
            flow_action: Some(FlowAction::Jump { target_index }),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn has_branches(&self) -> bool {
        !self.then_branch.is_empty() || !self.else_branch.is_empty()
    }
}

/// Legacy flat-mode control transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowAction {
    Jump {
        #[serde(rename = "targetIndex")]
        target_index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub prompt: String,
}

impl From<Step> for Instruction {
    fn from(step: Step) -> Self {
        Instruction::Step(step)
    }
}

impl From<Condition> for Instruction {
    fn from(condition: Condition) -> Self {
        Instruction::Condition(condition)
    }
}

/// Count every instruction, including all nested branch members.
pub fn count_instructions(instructions: &[Instruction]) -> usize {
    let mut total = 0;
    let mut pending = vec![instructions];

    while let Some(list) = pending.pop() {
        total += list.len();
        for instruction in list {
            if let Instruction::Condition(condition) = instruction {
                pending.push(condition.then_branch.as_slice());
                pending.push(condition.else_branch.as_slice());
            }
        }
    }

    total
}

/// Positional address of a nested instruction, e.g. `1.then.0`.
pub(crate) fn child_position(parent: Option<&str>, index: usize) -> String {
    match parent {
        Some(prefix) => format!("{prefix}.{index}"),
        None => index.to_string(),
    }
}

impl Job {
    pub fn new(name: impl Into<String>, start_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_url: start_url.into(),
            instructions: Vec::new(),
            addressing: None,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<Instruction>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    pub fn count_instructions(&self) -> usize {
        count_instructions(&self.instructions)
    }

    /// Addressing mode, declared or inferred.
    ///
    /// Any condition carrying a `flowAction` makes the job flat; nested
    /// branches make it a tree. Both at once is rejected.
    pub fn addressing_mode(&self) -> Result<AddressingMode, FlowError> {
        let mut has_jumps = false;
        let mut has_branches = false;
        let mut pending = vec![self.instructions.as_slice()];

        while let Some(list) = pending.pop() {
            for instruction in list {
                if let Instruction::Condition(condition) = instruction {
                    has_jumps |= condition.flow_action.is_some();
                    has_branches |= condition.has_branches();
                    pending.push(condition.then_branch.as_slice());
                    pending.push(condition.else_branch.as_slice());
                }
            }
        }

        if has_jumps && has_branches {
            return Err(FlowError::ValidationFailed(
                "job mixes nested branches with flat jump targets".to_string(),
            ));
        }

        let inferred = if has_jumps {
            AddressingMode::Flat
        } else {
            AddressingMode::Tree
        };

        match self.addressing {
            Some(AddressingMode::Tree) if has_jumps => Err(FlowError::ValidationFailed(
                "job declares tree addressing but uses flowAction jumps".to_string(),
            )),
            Some(AddressingMode::Flat) if has_branches => Err(FlowError::ValidationFailed(
                "job declares flat addressing but nests branches".to_string(),
            )),
            Some(declared) => Ok(declared),
            None => Ok(inferred),
        }
    }

    /// Check the job is executable and return its addressing mode.
    pub fn validate(&self, max_depth: usize) -> Result<AddressingMode, FlowError> {
        if self.name.trim().is_empty() {
            return Err(FlowError::ValidationFailed(
                "job name cannot be empty".to_string(),
            ));
        }

        let mode = self.addressing_mode()?;
        let top_level = self.instructions.len();
        let mut pending: Vec<(&[Instruction], Option<String>, usize)> =
            vec![(self.instructions.as_slice(), None, 1)];

        while let Some((list, prefix, depth)) = pending.pop() {
            if depth > max_depth {
                return Err(FlowError::InvalidStructure {
                    position: prefix.unwrap_or_default(),
                    reason: format!("nesting deeper than {max_depth} levels"),
                });
            }

            for (index, instruction) in list.iter().enumerate() {
                let position = child_position(prefix.as_deref(), index);
                match instruction {
                    Instruction::Step(step) => step.validate(&position)?,
                    Instruction::AiAction(_) => {}
                    Instruction::Condition(condition) => {
                        if condition.predicate.depth() > max_depth {
                            return Err(FlowError::InvalidStructure {
                                position,
                                reason: format!("predicate deeper than {max_depth} levels"),
                            });
                        }

                        match mode {
                            AddressingMode::Tree => {
                                if condition.then_branch.is_empty() {
                                    return Err(FlowError::InvalidStructure {
                                        position,
                                        reason: "condition has an empty then branch".to_string(),
                                    });
                                }
                                pending.push((
                                    condition.then_branch.as_slice(),
                                    Some(format!("{position}.then")),
                                    depth + 1,
                                ));
                                pending.push((
                                    condition.else_branch.as_slice(),
                                    Some(format!("{position}.else")),
                                    depth + 1,
                                ));
                            }
                            AddressingMode::Flat => match &condition.flow_action {
                                Some(FlowAction::Jump { target_index })
                                    if *target_index > top_level =>
                                {
                                    return Err(FlowError::InvalidJump {
                                        position,
                                        target: *target_index,
                                        len: top_level,
                                    });
                                }
                                _ => {}
                            },
                        }
                    }
                }
            }
        }

        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: bool) -> Predicate {
        Predicate::Literal { value }
    }

    #[test]
    fn counts_nested_branch_members() {
        let condition = Condition::branch(
            literal(true),
            vec![
                Step::press_button("#a").into(),
                Step::press_button("#b").into(),
            ],
            vec![Step::press_button("#c").into()],
        );
        assert_eq!(count_instructions(&[condition.into()]), 4);
    }

    #[test]
    fn counts_plain_list_as_its_length() {
        let steps: Vec<Instruction> = (0..7)
            .map(|i| Step::press_button(format!("#b{i}")).into())
            .collect();
        assert_eq!(count_instructions(&steps), 7);
        assert_eq!(count_instructions(&[]), 0);
    }

    #[test]
    fn counting_survives_deep_nesting() {
        let mut node: Instruction = Step::press_button("#leaf").into();
        for _ in 0..2_000 {
            node = Condition::branch(literal(true), vec![node], Vec::new()).into();
        }
        assert_eq!(count_instructions(std::slice::from_ref(&node)), 2_001);
    }

    #[test]
    fn redirect_cannot_carry_target() {
        let job = Job::new("j", "").with_instruction(Step::redirect("https://a").with_target("#x"));
        let err = job.validate(64).unwrap_err();
        assert!(matches!(err, FlowError::InvalidStructure { ref position, .. } if position == "0"));
    }

    #[test]
    fn fill_input_requires_value_query() {
        let job = Job::new("j", "").with_instruction(Step::new(StepKind::FillInput).with_target("#q"));
        assert!(job.validate(64).is_err());
    }

    #[test]
    fn empty_then_branch_is_rejected_in_tree_mode() {
        let job = Job::new("j", "").with_instruction(Condition::branch(
            literal(true),
            Vec::new(),
            vec![Step::press_button("#c").into()],
        ));
        let err = job.validate(64).unwrap_err();
        assert_eq!(err.code(), "invalid_job");
    }

    #[test]
    fn nested_error_reports_branch_position() {
        let job = Job::new("j", "")
            .with_instruction(Step::press_button("#a"))
            .with_instruction(Condition::branch(
                literal(true),
                vec![Step::new(StepKind::ReadValue).into()],
                Vec::new(),
            ));
        match job.validate(64) {
            Err(FlowError::InvalidStructure { position, .. }) => {
                assert_eq!(position, "1.then.0")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mode_is_inferred_from_flow_actions() {
        let flat = Job::new("j", "")
            .with_instruction(Step::press_button("#a"))
            .with_instruction(Condition::jump(literal(false), 0));
        assert_eq!(flat.validate(64).unwrap(), AddressingMode::Flat);

        let tree = Job::new("j", "").with_instruction(Step::press_button("#a"));
        assert_eq!(tree.validate(64).unwrap(), AddressingMode::Tree);
    }

    #[test]
    fn mixing_modes_is_rejected() {
        let mut mixed = Condition::branch(
            literal(true),
            vec![Step::press_button("#a").into()],
            Vec::new(),
        );
        mixed.flow_action = Some(FlowAction::Jump { target_index: 0 });
        let job = Job::new("j", "").with_instruction(mixed);
        assert!(matches!(
            job.validate(64),
            Err(FlowError::ValidationFailed(_))
        ));
    }

    #[test]
    fn jump_targets_are_bounded() {
        let job = Job::new("j", "")
            .with_instruction(Step::press_button("#a"))
            .with_instruction(Condition::jump(literal(true), 2));
        assert!(job.validate(64).is_ok());

        let job = Job::new("j", "")
            .with_instruction(Step::press_button("#a"))
            .with_instruction(Condition::jump(literal(true), 3));
        assert!(matches!(
            job.validate(64),
            Err(FlowError::InvalidJump { target: 3, len: 2, .. })
        ));
    }

    #[test]
    fn depth_guard_rejects_pathological_nesting() {
        let mut node: Instruction = Step::press_button("#leaf").into();
        for _ in 0..10 {
            node = Condition::branch(literal(true), vec![node], Vec::new()).into();
        }
        let job = Job {
            name: "deep".into(),
            start_url: String::new(),
            instructions: vec![node],
            addressing: None,
        };
        assert!(job.validate(64).is_ok());
        assert!(matches!(
            job.validate(5),
            Err(FlowError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn deserializes_camel_case_job() {
        let yaml = r##"
name: search
startUrl: https://example.com
instructions:
  - type: step
    kind: fillInput
    target: "#q"
    valueQuery: { literal: rust }
    pressEnterAfterFill: true
    delayBeforeEnterMs: 250
  - type: condition
    predicate: { op: exists, operand: { returnValue: title } }
    then:
      - type: step
        kind: readValue
        target: h1
        capture: { name: title }
    else:
      - type: step
        kind: redirect
        url: https://example.com/fallback
"##;
        let job: Job = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.count_instructions(), 4);
        match &job.instructions[0] {
            Instruction::Step(step) => {
                assert_eq!(step.kind, StepKind::FillInput);
                assert_eq!(step.value_query, Some(ValueQuery::Literal("rust".into())));
                assert!(step.press_enter_after_fill);
                assert_eq!(step.delay_before_enter_ms, 250);
            }
            other => panic!("unexpected instruction {other:?}"),
        }
        assert_eq!(job.validate(64).unwrap(), AddressingMode::Tree);
    }

    #[test]
    fn deserializes_flat_jump() {
        let json = r##"{
            "name": "loop",
            "instructions": [
                { "type": "step", "kind": "pressButton", "target": "#next" },
                { "type": "condition",
                  "predicate": { "op": "previousStepSucceeded" },
                  "flowAction": { "jump": { "targetIndex": 0 } } }
            ]
        }"##;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.start_url, "");
        assert_eq!(job.validate(64).unwrap(), AddressingMode::Flat);
    }

    #[test]
    fn explicit_nulls_fall_back_to_defaults() {
        let json = r##"{
            "type": "step",
            "kind": "pressButton",
            "target": "#submit",
            "waitForNavigation": null,
            "pressEnterAfterFill": null,
            "delayBeforeEnterMs": null,
            "waitForElementTimeoutMs": null
        }"##;
        let instruction: Instruction = serde_json::from_str(json).unwrap();
        match instruction {
            Instruction::Step(step) => {
                assert!(!step.wait_for_navigation);
                assert!(!step.press_enter_after_fill);
                assert_eq!(step.delay_before_enter_ms, 0);
                assert_eq!(step.wait_for_element_timeout_ms, None);
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }
}
