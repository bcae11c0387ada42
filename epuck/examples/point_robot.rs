use anyhow::Result;
use clap::Parser;
use epuck::{
    point_robot::{PointRobot, PointRobotConfig},
    trainer::{evaluate, Trainer, TrainerConfig},
};
use epuck_candle_agent::{
    ddpg::{ActorConfig, CriticConfig, Ddpg, DdpgConfig},
    mlp::{Mlp, MlpConfig},
    opt::OptimizerConfig,
    Device,
};
use epuck_core::{
    replay_buffer::{SimpleReplayBuffer, SimpleReplayBufferConfig},
    ReplayBufferBase,
};
use log::info;

const LR_ACTOR: f64 = 1e-3;
const LR_CRITIC: f64 = 1e-3;
const BATCH_SIZE: usize = 64;
const WARMUP_PERIOD: usize = 500;
const REPLAY_BUFFER_CAPACITY: usize = 100_000;

/// Train a DDPG agent to drive a point robot to the origin
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of environment steps
    #[arg(long, default_value_t = 5_000)]
    max_env_steps: usize,

    /// Interval of evaluation in environment steps
    #[arg(long, default_value_t = 500)]
    eval_interval: usize,

    /// Seed of the environment and the replay buffer
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Standard deviation of the exploration noise
    #[arg(long, default_value_t = 0.1)]
    noise_scale: f64,

    /// Load the agent configuration from a YAML file
    #[arg(long)]
    config: Option<String>,

    /// Save the agent configuration into a YAML file
    #[arg(long)]
    save_config: Option<String>,

    /// Use the GPU with this ordinal
    #[arg(long)]
    cuda: Option<usize>,
}

fn agent_config(args: &Args) -> DdpgConfig<MlpConfig, MlpConfig> {
    let (state_dim, act_dim) = (PointRobot::STATE_DIM, PointRobot::ACT_DIM);
    let actor_config = ActorConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_ACTOR))
        .pi_config(MlpConfig::new(state_dim, vec![64, 64], act_dim, false))
        .act_limit(1.0);
    let critic_config = CriticConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_CRITIC))
        .q_config(MlpConfig::new(state_dim + act_dim, vec![64, 64], 1, false));
    let device = match args.cuda {
        Some(n) => Device::Cuda(n),
        None => Device::Cpu,
    };

    DdpgConfig::default()
        .actor_config(actor_config)
        .critic_config(critic_config)
        .batch_size(BATCH_SIZE)
        .min_transitions_warmup(WARMUP_PERIOD)
        .noise_scale(args.noise_scale)
        .device(device)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => DdpgConfig::load(path)?,
        None => agent_config(&args),
    };
    if let Some(path) = &args.save_config {
        config.save(path)?;
    }

    let mut env = PointRobot::build(&PointRobotConfig::default().seed(args.seed))?;
    let mut agent = Ddpg::<Mlp, Mlp>::build(config)?;
    let mut buffer = SimpleReplayBuffer::build(
        &SimpleReplayBufferConfig::default()
            .capacity(REPLAY_BUFFER_CAPACITY)
            .state_dim(PointRobot::STATE_DIM)
            .act_dim(PointRobot::ACT_DIM)
            .seed(args.seed),
    )?;

    let before = evaluate(&mut env, &agent, 10)?;
    let mut trainer = Trainer::build(
        TrainerConfig::default()
            .max_env_steps(args.max_env_steps)
            .eval_interval(args.eval_interval),
    )?;
    trainer.train(&mut env, &mut agent, &mut buffer)?;
    let after = evaluate(&mut env, &agent, 10)?;

    info!(
        "Mean return over 10 episodes: {:.3} before training, {:.3} after {} updates",
        before,
        after,
        agent.n_opts()
    );

    Ok(())
}
