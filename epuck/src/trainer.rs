//! Interaction loop of the demo.
use crate::point_robot::PointRobot;
use anyhow::Result;
use candle_core::Tensor;
use chrono::Local;
use epuck_candle_agent::{
    ddpg::{Ddpg, TrainStats},
    model::{SubModel1, SubModel2},
    util::{InDim, OutDim},
};
use epuck_core::{
    error::DdpgError,
    record::{
        Record,
        RecordValue::{DateTime, Scalar},
    },
    ExperienceBufferBase, ReplayBufferBase, Transition, TransitionBatch,
};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Configuration of [`Trainer`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Total number of environment steps.
    pub max_env_steps: usize,

    /// Interval of optimization steps in environment steps.
    pub opt_interval: usize,

    /// Interval of evaluation in environment steps.
    pub eval_interval: usize,

    /// Number of episodes in each evaluation.
    pub n_episodes_per_eval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_env_steps: 10_000,
            opt_interval: 1,
            eval_interval: 1_000,
            n_episodes_per_eval: 5,
        }
    }
}

impl TrainerConfig {
    /// Sets the total number of environment steps.
    pub fn max_env_steps(mut self, v: usize) -> Self {
        self.max_env_steps = v;
        self
    }

    /// Sets the interval of optimization in environment steps.
    pub fn opt_interval(mut self, v: usize) -> Self {
        self.opt_interval = v;
        self
    }

    /// Sets the interval of evaluation in environment steps.
    pub fn eval_interval(mut self, v: usize) -> Self {
        self.eval_interval = v;
        self
    }

    /// Sets the number of episodes in each evaluation.
    pub fn n_episodes_per_eval(mut self, v: usize) -> Self {
        self.n_episodes_per_eval = v;
        self
    }
}

/// Runs episodes with exploration noise, stores the transitions and
/// updates the agent.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// Constructs [`Trainer`].
    pub fn build(config: TrainerConfig) -> Result<Self> {
        if config.opt_interval == 0 || config.eval_interval == 0 {
            return Err(DdpgError::InvalidConfig(
                "opt_interval and eval_interval must be positive".to_string(),
            )
            .into());
        }
        Ok(Self { config })
    }

    /// Trains the agent and returns the records taken at every evaluation.
    ///
    /// Each record holds `env_steps`, `n_opts`, `eval_return`, the time of
    /// the evaluation (`datetime`) and, once training has started, the
    /// losses of the latest update.
    pub fn train<Q, P, R>(
        &mut self,
        env: &mut PointRobot,
        agent: &mut Ddpg<Q, P>,
        buffer: &mut R,
    ) -> Result<Vec<Record>>
    where
        Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
        Q::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
        P: SubModel1<Input = Tensor, Output = Tensor>,
        P::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
        R: ReplayBufferBase<Batch = TransitionBatch> + ExperienceBufferBase<Item = Transition>,
    {
        let mut records = vec![];
        let mut last_stats: Option<TrainStats> = None;
        let mut state = env.reset();

        for env_steps in 1..=self.config.max_env_steps {
            let action = agent.explore(&state)?;
            let step = env.step(&action)?;
            buffer.push(Transition::new(
                state,
                action,
                step.reward,
                step.next_state.clone(),
                step.is_terminated,
            ))?;
            state = match step.is_done() {
                true => env.reset(),
                false => step.next_state,
            };

            if env_steps % self.config.opt_interval == 0 {
                if let Some(stats) = agent.train_step(buffer)? {
                    last_stats = Some(stats);
                }
            }

            if env_steps % self.config.eval_interval == 0 {
                info!("Starts evaluation of the trained model");
                let eval_return = evaluate(env, agent, self.config.n_episodes_per_eval)?;
                let mut record = Record::from_slice(&[
                    ("env_steps", Scalar(env_steps as f32)),
                    ("n_opts", Scalar(agent.n_opts() as f32)),
                    ("eval_return", Scalar(eval_return)),
                    ("datetime", DateTime(Local::now())),
                ]);
                if let Some(stats) = last_stats {
                    record = record.merge(stats.into());
                }
                info!("{}", format_record(&record));
                records.push(record);
                state = env.reset();
            }
        }

        Ok(records)
    }
}

/// Mean undiscounted return of noise-free episodes.
pub fn evaluate<Q, P>(env: &mut PointRobot, agent: &Ddpg<Q, P>, n_episodes: usize) -> Result<f32>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
{
    let mut total = 0f32;
    for _ in 0..n_episodes {
        let mut state = env.reset();
        loop {
            let step = env.step(&agent.act(&state)?)?;
            total += step.reward;
            if step.is_done() {
                break;
            }
            state = step.next_state;
        }
    }
    Ok(total / n_episodes.max(1) as f32)
}

fn format_record(record: &Record) -> String {
    let mut items = record
        .iter()
        .filter_map(|(k, v)| match v {
            Scalar(v) => Some(format!("{} = {:.4}", k, v)),
            _ => None,
        })
        .collect::<Vec<_>>();
    items.sort();
    items.join(", ")
}
