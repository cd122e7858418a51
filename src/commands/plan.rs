//! `preflight plan` and `preflight diff`

use anyhow::Result;

use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::{Workspace, display};

/// Show what apply would change
pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let workspace = Workspace::load(ctx, args)?;
    let plan = workspace.plan(args)?;
    display::show_plan(&plan, ctx.verbose > 0);
    Ok(())
}

/// Show the raw diffs only
pub fn diff(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let workspace = Workspace::load(ctx, args)?;
    let plan = workspace.plan(args)?;
    display::show_diffs(&plan);
    Ok(())
}
