//! Plan appender: a chain of plan-producing steps.
//!
//! Each step returns `Result<Plan, PlanError>`. The appender is the
//! boundary for step failures: a failed step is logged and the plan
//! accumulated before it is kept unchanged. The `*_if_empty` variants
//! only run their step while nothing has been planned yet, which gives
//! the builder its priority order.

use tracing::error;

use tessera_state::Plan;

use crate::error::PlanResult;

/// A sub-step of a sub-plan, over the builder context `C`.
pub type SubStep<'s, C> = Box<dyn Fn(&C) -> PlanResult<Plan> + 's>;

/// Combines the plans of several sub-steps into one.
pub type SubPlan<C> = for<'s> fn(&C, &[SubStep<'s, C>]) -> PlanResult<Plan>;

/// The first non-empty plan of `steps`, evaluated in order.
pub fn first_non_empty<C>(ctx: &C, steps: &[SubStep<'_, C>]) -> PlanResult<Plan> {
    for step in steps {
        let plan = step(ctx)?;
        if !plan.is_empty() {
            return Ok(plan);
        }
    }
    Ok(Plan::new())
}

/// The plans of all `steps`, in order.
pub fn concat<C>(ctx: &C, steps: &[SubStep<'_, C>]) -> PlanResult<Plan> {
    let mut plan = Plan::new();
    for step in steps {
        plan.append(step(ctx)?);
    }
    Ok(plan)
}

pub struct PlanAppender<'c, C> {
    ctx: &'c C,
    current: Plan,
}

impl<'c, C> PlanAppender<'c, C> {
    pub fn new(ctx: &'c C, current: Plan) -> Self {
        Self { ctx, current }
    }

    pub fn plan(self) -> Plan {
        self.current
    }

    fn accept(mut self, name: &str, result: PlanResult<Plan>) -> Self {
        match result {
            Ok(plan) => self.current.append(plan),
            Err(e) => {
                error!(step = name, error = %e, planned = self.current.len(), "plan step failed");
            }
        }
        self
    }

    pub fn apply<F>(self, name: &str, step: F) -> Self
    where
        F: FnOnce(&C) -> PlanResult<Plan>,
    {
        let result = step(self.ctx);
        self.accept(name, result)
    }

    pub fn apply_with_condition<P, F>(self, name: &str, condition: P, step: F) -> Self
    where
        P: FnOnce(&C) -> bool,
        F: FnOnce(&C) -> PlanResult<Plan>,
    {
        if !condition(self.ctx) {
            return self;
        }
        self.apply(name, step)
    }

    pub fn apply_sub_plan(self, name: &str, combine: SubPlan<C>, steps: &[SubStep<'_, C>]) -> Self {
        let result = combine(self.ctx, steps);
        self.accept(name, result)
    }

    pub fn apply_if_empty<F>(self, name: &str, step: F) -> Self
    where
        F: FnOnce(&C) -> PlanResult<Plan>,
    {
        if !self.current.is_empty() {
            return self;
        }
        self.apply(name, step)
    }

    pub fn apply_with_condition_if_empty<P, F>(self, name: &str, condition: P, step: F) -> Self
    where
        P: FnOnce(&C) -> bool,
        F: FnOnce(&C) -> PlanResult<Plan>,
    {
        if !self.current.is_empty() {
            return self;
        }
        self.apply_with_condition(name, condition, step)
    }

    pub fn apply_sub_plan_if_empty(
        self,
        name: &str,
        combine: SubPlan<C>,
        steps: &[SubStep<'_, C>],
    ) -> Self {
        if !self.current.is_empty() {
            return self;
        }
        self.apply_sub_plan(name, combine, steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use tessera_state::{Action, ActionType, ServerGroup};

    fn one(ty: ActionType) -> PlanResult<Plan> {
        Ok(Plan::from(vec![Action::new(ty, ServerGroup::Agents, "AGNT-1")]))
    }

    fn none(_: &()) -> PlanResult<Plan> {
        Ok(Plan::new())
    }

    fn boom(_: &()) -> PlanResult<Plan> {
        Err(PlanError::Step("boom".to_string()))
    }

    #[test]
    fn if_empty_is_noop_after_non_empty_step() {
        let rotate: Vec<SubStep<'_, ()>> = vec![Box::new(|_: &()| one(ActionType::RotateMember))];
        let plan = PlanAppender::new(&(), Plan::new())
            .apply_if_empty("empty", none)
            .apply_if_empty("add", |_| one(ActionType::AddMember))
            .apply_if_empty("remove", |_| one(ActionType::RemoveMember))
            .apply_with_condition_if_empty("cond", |_| true, |_| one(ActionType::KillMemberPod))
            .apply_sub_plan_if_empty("sub", concat, &rotate)
            .plan();
        assert_eq!(plan.types(), vec![ActionType::AddMember]);
    }

    #[test]
    fn plain_apply_always_appends() {
        let plan = PlanAppender::new(&(), Plan::new())
            .apply("a", |_| one(ActionType::RemoveMember))
            .apply("b", |_| one(ActionType::AddMember))
            .plan();
        assert_eq!(plan.types(), vec![ActionType::RemoveMember, ActionType::AddMember]);
    }

    #[test]
    fn failed_step_keeps_previous_plan() {
        let plan = PlanAppender::new(&(), Plan::new())
            .apply("a", |_| one(ActionType::RemoveMember))
            .apply("broken", boom)
            .apply("b", |_| one(ActionType::AddMember))
            .plan();
        assert_eq!(plan.types(), vec![ActionType::RemoveMember, ActionType::AddMember]);

        let plan = PlanAppender::new(&(), Plan::new())
            .apply_if_empty("broken", boom)
            .plan();
        assert!(plan.is_empty());
    }

    #[test]
    fn condition_gates_step() {
        let plan = PlanAppender::new(&(), Plan::new())
            .apply_with_condition("off", |_| false, |_| one(ActionType::AddMember))
            .plan();
        assert!(plan.is_empty());
    }

    #[test]
    fn first_non_empty_stops_at_first_plan() {
        let steps: Vec<SubStep<'_, ()>> = vec![
            Box::new(none),
            Box::new(|_: &()| one(ActionType::RotateMember)),
            Box::new(|_: &()| one(ActionType::KillMemberPod)),
        ];
        let plan = first_non_empty(&(), &steps).unwrap();
        assert_eq!(plan.types(), vec![ActionType::RotateMember]);

        let plan = concat(&(), &steps).unwrap();
        assert_eq!(
            plan.types(),
            vec![ActionType::RotateMember, ActionType::KillMemberPod]
        );
    }

    #[test]
    fn failing_sub_step_drops_whole_sub_plan() {
        let steps: Vec<SubStep<'_, ()>> = vec![
            Box::new(|_: &()| one(ActionType::RotateMember)),
            Box::new(boom),
        ];
        let plan = PlanAppender::new(&(), Plan::new())
            .apply("a", |_| one(ActionType::AddMember))
            .apply_sub_plan("rotation", concat, &steps)
            .plan();
        assert_eq!(plan.types(), vec![ActionType::AddMember]);
    }
}
