use crate::config::Config;
use crate::error::InitError;
use crate::gl::GraphicsContext;
use crate::run_loop::RunLoop;
use crate::scene::Scene;

/// Sets the scene up on `ctx` and runs it. The loop is only entered once
/// every binding has been resolved.
pub fn run<C: GraphicsContext>(
    ctx: &mut C,
    config: &Config,
    run_loop: &RunLoop,
) -> Result<u64, InitError> {
    let mut scene = Scene::bootstrap(ctx, config)?;
    Ok(run_loop.run(&mut scene, ctx))
}
