//! Release body rendering.

use crate::context::RunContext;
use crate::domain::ModuleRelease;

const UNKNOWN: &str = "unknown";

/// Render the Markdown body attached to a module's release.
///
/// The output depends only on `release` and `ctx`.
pub fn render_release_body(release: &ModuleRelease, ctx: &RunContext) -> String {
    let locator = release.source_locator(&ctx.server_url, &ctx.repository);

    let run = match (&ctx.run_id, ctx.run_url()) {
        (Some(id), Some(url)) => format!("[{id}]({url})"),
        _ => UNKNOWN.to_string(),
    };
    let pr = match (ctx.pr_number, ctx.pr_url()) {
        (Some(n), Some(url)) => format!("[#{n}]({url})"),
        _ => UNKNOWN.to_string(),
    };

    format!(
        "## {name} {version}\n\
         \n\
         | | |\n\
         |---|---|\n\
         | Version | `{version}` |\n\
         | Type | `{module_type}` |\n\
         | Name | `{name}` |\n\
         \n\
         ### Usage\n\
         \n\
         ```hcl\n\
         source = \"{locator}\"\n\
         ```\n\
         \n\
         ### Provenance\n\
         \n\
         - Workflow run: {run}\n\
         - Pull request: {pr}\n",
        name = release.name(),
        version = release.version(),
        module_type = release.module_type(),
    )
}
