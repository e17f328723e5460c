//! Flow control over tree and flat programs.
//!
//! Both addressing modes implement [`Program`]: the tree walker keeps an
//! explicit frame stack, the flat adapter keeps a cursor that jumps can
//! rewind. [`FlowController`] sits on top and enforces the step bound.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::errors::FlowError;
use crate::model::{child_position, AddressingMode, Condition, FlowAction, Instruction, Job};

/// Branch decision taken at a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum FlowDecision {
    BranchThen,
    BranchElse,
    Jump {
        target: usize,
        /// Re-enters an earlier instruction
        backward: bool,
    },
    Advance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Ready,
    Evaluating,
    BranchThen,
    BranchElse,
    Jump(usize),
    Advance,
    Terminal,
}

impl From<FlowDecision> for FlowState {
    fn from(decision: FlowDecision) -> Self {
        match decision {
            FlowDecision::BranchThen => FlowState::BranchThen,
            FlowDecision::BranchElse => FlowState::BranchElse,
            FlowDecision::Jump { target, .. } => FlowState::Jump(target),
            FlowDecision::Advance => FlowState::Advance,
        }
    }
}

/// An instruction together with its positional address.
#[derive(Debug, Clone)]
pub struct Located<'a> {
    pub position: String,
    pub instruction: &'a Instruction,
}

/// Cursor over a job's instructions.
pub trait Program<'a>: Send {
    fn mode(&self) -> AddressingMode;

    /// Next instruction in execution order, or `None` past the end.
    fn next_instruction(&mut self) -> Option<Located<'a>>;

    /// Move the cursor according to a condition's predicate result.
    fn resolve_condition(
        &mut self,
        position: &str,
        condition: &'a Condition,
        holds: bool,
    ) -> Result<FlowDecision, FlowError>;
}

struct Frame<'a> {
    items: &'a [Instruction],
    next: usize,
    prefix: Option<String>,
}

/// Depth-first walk of a nested instruction tree.
pub struct TreeProgram<'a> {
    frames: Vec<Frame<'a>>,
}

impl<'a> TreeProgram<'a> {
    pub fn new(instructions: &'a [Instruction]) -> Self {
        Self {
            frames: vec![Frame {
                items: instructions,
                next: 0,
                prefix: None,
            }],
        }
    }

    /// Current nesting depth (1 at the root list).
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn enter(&mut self, items: &'a [Instruction], prefix: String) {
        if !items.is_empty() {
            self.frames.push(Frame {
                items,
                next: 0,
                prefix: Some(prefix),
            });
        }
    }
}

impl<'a> Program<'a> for TreeProgram<'a> {
    fn mode(&self) -> AddressingMode {
        AddressingMode::Tree
    }

    fn next_instruction(&mut self) -> Option<Located<'a>> {
        loop {
            let frame = self.frames.last_mut()?;
            if frame.next >= frame.items.len() {
                self.frames.pop();
                continue;
            }

            let index = frame.next;
            frame.next += 1;
            let items = frame.items;
            return Some(Located {
                position: child_position(frame.prefix.as_deref(), index),
                instruction: &items[index],
            });
        }
    }

    fn resolve_condition(
        &mut self,
        position: &str,
        condition: &'a Condition,
        holds: bool,
    ) -> Result<FlowDecision, FlowError> {
        if holds {
            self.enter(&condition.then_branch, format!("{position}.then"));
            Ok(FlowDecision::BranchThen)
        } else {
            self.enter(&condition.else_branch, format!("{position}.else"));
            Ok(FlowDecision::BranchElse)
        }
    }
}

/// Legacy flat list where conditions jump by index.
pub struct FlatProgram<'a> {
    items: &'a [Instruction],
    cursor: usize,
}

impl<'a> FlatProgram<'a> {
    pub fn new(instructions: &'a [Instruction]) -> Self {
        Self {
            items: instructions,
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl<'a> Program<'a> for FlatProgram<'a> {
    fn mode(&self) -> AddressingMode {
        AddressingMode::Flat
    }

    fn next_instruction(&mut self) -> Option<Located<'a>> {
        let index = self.cursor;
        let instruction = self.items.get(index)?;
        self.cursor += 1;
        Some(Located {
            position: index.to_string(),
            instruction,
        })
    }

    fn resolve_condition(
        &mut self,
        position: &str,
        condition: &'a Condition,
        holds: bool,
    ) -> Result<FlowDecision, FlowError> {
        match (&condition.flow_action, holds) {
            (Some(FlowAction::Jump { target_index }), true) => {
                let target = *target_index;
                if target > self.items.len() {
                    return Err(FlowError::InvalidJump {
                        position: position.to_string(),
                        target,
                        len: self.items.len(),
                    });
                }
                // cursor already points past the condition
                let current = self.cursor.saturating_sub(1);
                self.cursor = target;
                Ok(FlowDecision::Jump {
                    target,
                    backward: target <= current,
                })
            }
            _ => Ok(FlowDecision::Advance),
        }
    }
}

/// What the supervisor should do next.
#[derive(Debug)]
pub enum Next<'a> {
    Instruction(Located<'a>),
    Terminal,
}

/// Drives a [`Program`], tracks the flow state and enforces the step bound.
pub struct FlowController<'a> {
    program: Box<dyn Program<'a> + 'a>,
    state: FlowState,
    max_steps: u64,
}

impl<'a> FlowController<'a> {
    pub fn new(program: Box<dyn Program<'a> + 'a>, max_steps: u64) -> Self {
        Self {
            program,
            state: FlowState::Ready,
            max_steps,
        }
    }

    /// Controller over a job in the given addressing mode.
    pub fn for_job(job: &'a Job, mode: AddressingMode, max_steps: u64) -> Self {
        let program: Box<dyn Program<'a> + 'a> = match mode {
            AddressingMode::Tree => Box::new(TreeProgram::new(&job.instructions)),
            AddressingMode::Flat => Box::new(FlatProgram::new(&job.instructions)),
        };
        Self::new(program, max_steps)
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn mode(&self) -> AddressingMode {
        self.program.mode()
    }

    /// Next instruction to execute, or `Terminal` once the program is exhausted.
    ///
    /// Fails with `LoopLimitExceeded` when another instruction is pending but
    /// the context already executed `max_steps` instructions.
    pub fn next(&mut self, context: &ExecutionContext) -> Result<Next<'a>, FlowError> {
        if self.state == FlowState::Terminal {
            return Ok(Next::Terminal);
        }

        match self.program.next_instruction() {
            None => {
                self.state = FlowState::Terminal;
                Ok(Next::Terminal)
            }
            Some(_) if context.steps_executed() >= self.max_steps => {
                self.state = FlowState::Terminal;
                Err(FlowError::LoopLimitExceeded(self.max_steps))
            }
            Some(located) => {
                self.state = FlowState::Ready;
                Ok(Next::Instruction(located))
            }
        }
    }

    /// Evaluate a condition's predicate and move the cursor accordingly.
    pub fn evaluate(
        &mut self,
        position: &str,
        condition: &'a Condition,
        context: &ExecutionContext,
    ) -> Result<FlowDecision, FlowError> {
        self.state = FlowState::Evaluating;
        let holds = condition.predicate.evaluate(context);
        let decision = match self.program.resolve_condition(position, condition, holds) {
            Ok(decision) => decision,
            Err(err) => {
                self.state = FlowState::Terminal;
                return Err(err);
            }
        };
        self.state = decision.into();
        debug!(position = %position, holds, ?decision, "Condition evaluated");
        Ok(decision)
    }

    /// Stop the run; subsequent `next` calls return `Terminal`.
    pub fn terminate(&mut self) {
        self.state = FlowState::Terminal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;
    use crate::predicate::Predicate;

    fn step(name: &str) -> Instruction {
        Step::press_button(format!("#{name}")).into()
    }

    fn literal(value: bool) -> Predicate {
        Predicate::Literal { value }
    }

    fn drain(controller: &mut FlowController<'_>, context: &mut ExecutionContext) -> Vec<String> {
        let mut visited = Vec::new();
        while let Ok(Next::Instruction(located)) = controller.next(context) {
            if let Instruction::Condition(condition) = located.instruction {
                controller
                    .evaluate(&located.position, condition, context)
                    .unwrap();
            }
            context.count_instruction();
            visited.push(located.position);
        }
        visited
    }

    #[test]
    fn tree_walk_is_depth_first() {
        let job = Job::new("tree", "")
            .with_instruction(step("a"))
            .with_instruction(Condition::branch(
                literal(true),
                vec![
                    step("b"),
                    Condition::branch(literal(false), vec![step("x")], vec![step("c")]).into(),
                ],
                vec![step("y")],
            ))
            .with_instruction(step("d"));

        let mut controller = FlowController::for_job(&job, AddressingMode::Tree, 100);
        let mut context = ExecutionContext::new();
        let visited = drain(&mut controller, &mut context);

        assert_eq!(
            visited,
            vec!["0", "1", "1.then.0", "1.then.1", "1.then.1.else.0", "2"]
        );
        assert_eq!(controller.state(), FlowState::Terminal);
    }

    #[test]
    fn empty_else_branch_continues_with_sibling() {
        let job = Job::new("tree", "")
            .with_instruction(Condition::branch(literal(false), vec![step("a")], Vec::new()))
            .with_instruction(step("b"));

        let mut controller = FlowController::for_job(&job, AddressingMode::Tree, 100);
        let mut context = ExecutionContext::new();
        assert_eq!(drain(&mut controller, &mut context), vec!["0", "1"]);
    }

    #[test]
    fn flat_jump_skips_forward() {
        let job = Job::new("flat", "")
            .with_instruction(Condition::jump(literal(true), 3))
            .with_instruction(step("skipped"))
            .with_instruction(step("skipped-too"))
            .with_instruction(step("landed"));

        let mut controller = FlowController::for_job(&job, AddressingMode::Flat, 100);
        let mut context = ExecutionContext::new();
        assert_eq!(drain(&mut controller, &mut context), vec!["0", "3"]);
    }

    #[test]
    fn jump_to_end_terminates() {
        let job = Job::new("flat", "")
            .with_instruction(Condition::jump(literal(true), 2))
            .with_instruction(step("skipped"));

        let mut controller = FlowController::for_job(&job, AddressingMode::Flat, 100);
        let mut context = ExecutionContext::new();
        assert_eq!(drain(&mut controller, &mut context), vec!["0"]);
    }

    #[test]
    fn backward_jump_is_flagged() {
        let job = Job::new("flat", "")
            .with_instruction(step("a"))
            .with_instruction(Condition::jump(literal(true), 0));
        let mut controller = FlowController::for_job(&job, AddressingMode::Flat, 100);
        let context = ExecutionContext::new();

        let _first = controller.next(&context).unwrap();
        let located = match controller.next(&context).unwrap() {
            Next::Instruction(located) => located,
            Next::Terminal => panic!("expected the condition"),
        };
        let condition = match located.instruction {
            Instruction::Condition(condition) => condition,
            _ => panic!("expected a condition"),
        };
        let decision = controller
            .evaluate(&located.position, condition, &context)
            .unwrap();
        assert_eq!(
            decision,
            FlowDecision::Jump {
                target: 0,
                backward: true
            }
        );
        assert_eq!(controller.state(), FlowState::Jump(0));
    }

    #[test]
    fn unconditional_backward_jump_hits_loop_limit() {
        let job = Job::new("flat", "")
            .with_instruction(step("a"))
            .with_instruction(Condition::jump(literal(true), 0));

        let mut controller = FlowController::for_job(&job, AddressingMode::Flat, 25);
        let mut context = ExecutionContext::new();
        let visited = drain(&mut controller, &mut context);
        assert_eq!(visited.len(), 25);
        assert_eq!(context.steps_executed(), 25);
        assert_eq!(controller.state(), FlowState::Terminal);
    }

    #[test]
    fn limit_is_not_hit_when_program_ends_exactly() {
        let job = Job::new("tree", "")
            .with_instruction(step("a"))
            .with_instruction(step("b"));
        let mut controller = FlowController::for_job(&job, AddressingMode::Tree, 2);
        let mut context = ExecutionContext::new();
        assert_eq!(drain(&mut controller, &mut context).len(), 2);
        assert!(matches!(controller.next(&context), Ok(Next::Terminal)));
    }

    #[test]
    fn terminate_is_sticky() {
        let job = Job::new("tree", "").with_instruction(step("a"));
        let mut controller = FlowController::for_job(&job, AddressingMode::Tree, 10);
        controller.terminate();
        assert!(matches!(
            controller.next(&ExecutionContext::new()),
            Ok(Next::Terminal)
        ));
    }
}
