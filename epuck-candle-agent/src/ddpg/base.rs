use super::{Actor, Critic, DdpgConfig, TargetNetwork};
use crate::{
    model::{SubModel1, SubModel2},
    util::{finite_loss, gamma_not_done, rows_to_tensor, InDim, OutDim},
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::loss::mse;
use epuck_core::{
    error::DdpgError,
    record::{Record, RecordValue},
    ExperienceBufferBase, ReplayBufferBase, TransitionBatch,
};
use log::{debug, info, trace, warn};
use serde::{de::DeserializeOwned, Serialize};

/// Losses of a training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainStats {
    /// Mean squared Bellman error of the critic.
    pub critic_loss: f32,

    /// Negative mean action value of the actor's actions.
    pub actor_loss: f32,
}

impl From<TrainStats> for Record {
    fn from(stats: TrainStats) -> Self {
        Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(stats.critic_loss)),
            ("loss_actor", RecordValue::Scalar(stats.actor_loss)),
        ])
    }
}

/// A batch moved onto the device of the agent.
struct BatchTensors {
    state: Tensor,
    action: Tensor,
    reward: Tensor,
    next_state: Tensor,

    /// `gamma * (1 - is_done)`.
    gamma_not_done: Tensor,
}

/// Deep deterministic policy gradient (DDPG) agent.
///
/// Owns the live actor and critic and their target copies. Each update runs
/// a critic step, an actor step against the frozen critic and a Polyak
/// update of the targets, in that order.
pub struct Ddpg<Q, P>
where
    Q: SubModel2,
    P: SubModel1,
{
    actor: Actor<P>,
    critic: Critic<Q>,
    target: TargetNetwork<Q, P>,
    gamma: f64,
    tau: f64,
    batch_size: usize,
    n_updates_per_opt: usize,
    min_transitions_warmup: usize,
    noise_scale: f64,
    n_opts: usize,

    /// Set by the first non-finite loss; no update is applied afterwards.
    diverged: Option<DdpgError>,
    device: Device,
}

impl<Q, P> Ddpg<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
{
    /// Constructs [`Ddpg`] agent.
    ///
    /// The target networks start as exact copies of the live networks.
    pub fn build(config: DdpgConfig<Q::Config, P::Config>) -> Result<Self> {
        config.validate()?;
        let device: Device = config.device.unwrap_or_default().try_into()?;
        let actor = Actor::build(config.actor_config, device.clone())?;
        let critic = Critic::build(config.critic_config, device.clone())?;
        if critic.in_dim() != actor.in_dim() + actor.out_dim() {
            return Err(DdpgError::InvalidConfig(format!(
                "critic input dimension {} differs from state dim {} + action dim {}",
                critic.in_dim(),
                actor.in_dim(),
                actor.out_dim()
            ))
            .into());
        }
        let target = TargetNetwork::from_live(&actor, &critic)?;

        info!(
            "Build DDPG agent: state_dim = {}, act_dim = {}, gamma = {}, polyak = {}",
            actor.in_dim(),
            actor.out_dim(),
            config.gamma,
            config.polyak
        );

        Ok(Self {
            actor,
            critic,
            target,
            gamma: config.gamma,
            tau: 1.0 - config.polyak,
            batch_size: config.batch_size,
            n_updates_per_opt: config.n_updates_per_opt,
            min_transitions_warmup: config.min_transitions_warmup,
            noise_scale: config.noise_scale,
            n_opts: 0,
            diverged: None,
            device,
        })
    }

    /// Dimension of states.
    pub fn state_dim(&self) -> usize {
        self.actor.in_dim()
    }

    /// Dimension of actions.
    pub fn act_dim(&self) -> usize {
        self.actor.out_dim()
    }

    /// Bound of the actions.
    pub fn act_limit(&self) -> f64 {
        self.actor.act_limit()
    }

    /// Number of parameter updates applied so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Returns `true` once a non-finite loss has halted training.
    pub fn is_diverged(&self) -> bool {
        self.diverged.is_some()
    }

    /// Live actor.
    pub fn actor(&self) -> &Actor<P> {
        &self.actor
    }

    /// Live critic.
    pub fn critic(&self) -> &Critic<Q> {
        &self.critic
    }

    /// Target networks.
    pub fn target(&self) -> &TargetNetwork<Q, P> {
        &self.target
    }

    /// Returns `π(state)` plus Gaussian noise with standard deviation
    /// `noise_scale`, clipped to `[-act_limit, act_limit]`.
    ///
    /// With `noise_scale == 0` the output is deterministic.
    pub fn select_action(&self, state: &[f32], noise_scale: f64) -> Result<Vec<f32>> {
        if !(noise_scale.is_finite() && noise_scale >= 0.0) {
            return Err(DdpgError::InvalidNoiseScale(noise_scale).into());
        }
        if state.len() != self.state_dim() {
            return Err(DdpgError::shape_mismatch("state", self.state_dim(), state.len()).into());
        }

        let state = Tensor::from_slice(state, (1, self.state_dim()), &self.device)?;
        let act = self.actor.forward(&state)?.detach();
        let act = match noise_scale > 0.0 {
            false => act,
            true => {
                let limit = self.act_limit();
                let noise = act.randn_like(0.0, noise_scale)?;
                (act + noise)?.clamp(-limit, limit)?
            }
        };

        Ok(act.squeeze(0)?.to_vec1::<f32>()?)
    }

    /// Action with the noise scale given in the configuration.
    pub fn explore(&self, state: &[f32]) -> Result<Vec<f32>> {
        self.select_action(state, self.noise_scale)
    }

    /// Noise-free action.
    pub fn act(&self, state: &[f32]) -> Result<Vec<f32>> {
        self.select_action(state, 0.0)
    }

    fn ensure_not_diverged(&self) -> Result<()> {
        match &self.diverged {
            Some(e) => Err(e.clone().into()),
            None => Ok(()),
        }
    }

    fn batch_tensors(&self, batch: &TransitionBatch) -> Result<BatchTensors> {
        let (s, a) = (self.state_dim(), self.act_dim());
        if batch.state_dim() != s {
            return Err(DdpgError::shape_mismatch("batch state", s, batch.state_dim()).into());
        }
        if batch.act_dim() != a {
            return Err(DdpgError::shape_mismatch("batch action", a, batch.act_dim()).into());
        }

        let n = batch.len();
        Ok(BatchTensors {
            state: rows_to_tensor(batch.states(), n, s, &self.device)?,
            action: rows_to_tensor(batch.actions(), n, a, &self.device)?,
            reward: Tensor::from_slice(batch.rewards(), (n,), &self.device)?,
            next_state: rows_to_tensor(batch.next_states(), n, s, &self.device)?,
            gamma_not_done: gamma_not_done(self.gamma, batch.is_done(), &self.device)?,
        })
    }

    /// `r + gamma * (1 - done) * Q_tgt(s', π_tgt(s'))`, treated as a constant.
    fn bellman_target(&self, t: &BatchTensors) -> Result<Tensor> {
        let next_q = self.target.next_q(&t.next_state)?;
        Ok((&t.reward + (&t.gamma_not_done * next_q)?)?.detach())
    }

    fn update_critic(&mut self, t: &BatchTensors) -> Result<f32> {
        let tgt = self.bellman_target(t)?;
        let pred = self.critic.forward(&t.state, &t.action)?;
        let loss = mse(&pred, &tgt)?;
        let loss_value = finite_loss("critic_loss", &loss)?;

        self.critic.backward_step(&loss)?;

        Ok(loss_value)
    }

    fn update_actor(&mut self, t: &BatchTensors) -> Result<f32> {
        let critic = self.critic.freeze();
        let act = self.actor.forward(&t.state)?;
        let loss = critic.forward(&t.state, &act)?.mean_all()?.neg()?;
        let loss_value = finite_loss("actor_loss", &loss)?;

        self.actor.backward_step(&loss)?;

        Ok(loss_value)
    }

    fn soft_update(&mut self) -> Result<()> {
        self.target
            .sync_polyak(&self.actor, &self.critic, self.tau)
    }

    /// Records a divergence so that later updates are refused.
    fn check_divergence(&mut self, loss: Result<f32>) -> Result<f32> {
        if let Err(e) = &loss {
            if let Some(e @ DdpgError::DivergedTraining { .. }) = e.downcast_ref::<DdpgError>() {
                warn!("{}; parameter updates are halted", e);
                self.diverged = Some(e.clone());
            }
        }
        loss
    }

    /// Applies one critic step, one actor step and one target update.
    ///
    /// A non-finite loss is detected before the corresponding optimizer
    /// step; the agent then refuses any further update.
    pub fn one_step_update(&mut self, batch: &TransitionBatch) -> Result<TrainStats> {
        self.ensure_not_diverged()?;
        if batch.is_empty() {
            return Err(DdpgError::EmptyBatch.into());
        }
        let t = self.batch_tensors(batch)?;

        trace!("update_critic()");
        let critic_loss = self.update_critic(&t);
        let critic_loss = self.check_divergence(critic_loss)?;

        trace!("update_actor()");
        let actor_loss = self.update_actor(&t);
        let actor_loss = self.check_divergence(actor_loss)?;

        trace!("soft_update()");
        self.soft_update()?;

        self.n_opts += 1;
        debug!(
            "n_opts = {}, critic_loss = {}, actor_loss = {}",
            self.n_opts, critic_loss, actor_loss
        );

        Ok(TrainStats {
            critic_loss,
            actor_loss,
        })
    }

    /// Samples batches from `buffer` and updates the agent.
    ///
    /// Returns `Ok(None)` while the buffer holds fewer transitions than
    /// `min_transitions_warmup`. Losses are averaged over the
    /// `n_updates_per_opt` updates.
    pub fn train_step<R>(&mut self, buffer: &mut R) -> Result<Option<TrainStats>>
    where
        R: ReplayBufferBase<Batch = TransitionBatch> + ExperienceBufferBase,
    {
        self.ensure_not_diverged()?;
        let n_transitions = buffer.try_len()?;
        if n_transitions < self.min_transitions_warmup {
            trace!(
                "Warm-up: {} of {} transitions",
                n_transitions,
                self.min_transitions_warmup
            );
            return Ok(None);
        }

        let mut critic_loss = 0f32;
        let mut actor_loss = 0f32;

        for _ in 0..self.n_updates_per_opt {
            trace!("batch()");
            let batch = buffer.batch(self.batch_size)?;
            let stats = self.one_step_update(&batch)?;
            critic_loss += stats.critic_loss;
            actor_loss += stats.actor_loss;
        }

        Ok(Some(TrainStats {
            critic_loss: critic_loss / self.n_updates_per_opt as f32,
            actor_loss: actor_loss / self.n_updates_per_opt as f32,
        }))
    }

    /// Mean and standard deviation of every live parameter.
    pub fn param_stats(&self) -> Result<Record> {
        let actor = crate::util::param_stats(self.actor.get_varmap(), "actor")?;
        let critic = crate::util::param_stats(self.critic.get_varmap(), "critic")?;
        Ok(actor.merge(critic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ddpg::{ActorConfig, CriticConfig},
        mlp::{Mlp, MlpConfig},
        opt::OptimizerConfig,
        util::NamedTensors,
    };
    use candle_core::DType;
    use epuck_core::{
        replay_buffer::{SimpleReplayBuffer, SimpleReplayBufferConfig},
        Transition,
    };

    const STATE_DIM: usize = 3;
    const ACT_DIM: usize = 2;

    fn config() -> DdpgConfig<MlpConfig, MlpConfig> {
        let opt_config = OptimizerConfig::Adam { lr: 1e-3 };
        DdpgConfig::default()
            .actor_config(
                ActorConfig::default()
                    .pi_config(MlpConfig::new(STATE_DIM, vec![16, 16], ACT_DIM, false))
                    .opt_config(opt_config.clone()),
            )
            .critic_config(
                CriticConfig::default()
                    .q_config(MlpConfig::new(STATE_DIM + ACT_DIM, vec![16, 16], 1, false))
                    .opt_config(opt_config),
            )
            .batch_size(8)
    }

    fn agent() -> Result<Ddpg<Mlp, Mlp>> {
        Ddpg::build(config())
    }

    fn transition(i: usize, reward: f32, done: bool) -> Transition {
        let x = i as f32 * 0.1;
        Transition::new(
            vec![x, -x, 0.5],
            vec![0.3, -0.2],
            reward,
            vec![x + 0.1, -x, 0.4],
            done,
        )
    }

    fn batch(n: usize, done: bool) -> Result<TransitionBatch> {
        let trs = (0..n)
            .map(|i| transition(i, i as f32 - 2.0, done))
            .collect::<Vec<_>>();
        TransitionBatch::from_transitions(&trs, STATE_DIM, ACT_DIM)
    }

    fn snapshot(agent: &Ddpg<Mlp, Mlp>) -> Result<[NamedTensors; 4]> {
        Ok([
            NamedTensors::copy_from(agent.actor.get_varmap())?,
            NamedTensors::copy_from(agent.critic.get_varmap())?,
            NamedTensors::copy_from(agent.target.actor().get_varmap())?,
            NamedTensors::copy_from(agent.target.critic().get_varmap())?,
        ])
    }

    fn assert_error(err: anyhow::Error, f: impl Fn(&DdpgError) -> bool) {
        match err.downcast_ref::<DdpgError>() {
            Some(e) if f(e) => {}
            _ => panic!("unexpected error: {:?}", err),
        }
    }

    #[test]
    fn test_target_starts_as_copy() -> Result<()> {
        let agent = agent()?;
        let [actor, critic, actor_tgt, critic_tgt] = snapshot(&agent)?;
        assert_eq!(actor.max_abs_diff(&actor_tgt)?, 0.0);
        assert_eq!(critic.max_abs_diff(&critic_tgt)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_target_tracks_with_polyak() -> Result<()> {
        let mut agent = agent()?;
        let [_, _, actor_tgt_old, critic_tgt_old] = snapshot(&agent)?;
        agent.one_step_update(&batch(8, false)?)?;
        let [actor, critic, actor_tgt, critic_tgt] = snapshot(&agent)?;

        for (old, live, new) in [
            (&actor_tgt_old, &actor, &actor_tgt),
            (&critic_tgt_old, &critic, &critic_tgt),
        ] {
            for (name, t_old) in old.named_tensors.iter() {
                let t_live = live.get(name).unwrap();
                let expected = ((t_old * 0.995)? + (t_live * 0.005)?)?;
                let diff = (new.get(name).unwrap() - expected)?
                    .abs()?
                    .flatten_all()?
                    .max(0)?
                    .to_scalar::<f32>()?;
                assert!(diff < 1e-6, "{}: {}", name, diff);
            }
        }
        Ok(())
    }

    #[test]
    fn test_critic_is_frozen_during_actor_step() -> Result<()> {
        let mut agent = agent()?;
        let t = agent.batch_tensors(&batch(8, false)?)?;

        let [actor0, critic0, _, _] = snapshot(&agent)?;
        agent.update_critic(&t)?;
        let [actor1, critic1, _, _] = snapshot(&agent)?;
        assert!(critic0.max_abs_diff(&critic1)? > 0.0);
        assert_eq!(actor0.max_abs_diff(&actor1)?, 0.0);

        agent.update_actor(&t)?;
        let [actor2, critic2, _, _] = snapshot(&agent)?;
        assert_eq!(critic1.max_abs_diff(&critic2)?, 0.0);
        assert!(actor1.max_abs_diff(&actor2)? > 0.0);
        assert!(agent.critic.is_trainable());
        Ok(())
    }

    #[test]
    fn test_freeze_is_released_on_error() -> Result<()> {
        let mut agent = agent()?;
        let t = BatchTensors {
            state: Tensor::zeros((4, STATE_DIM + 1), DType::F32, &Device::Cpu)?,
            action: Tensor::zeros((4, ACT_DIM), DType::F32, &Device::Cpu)?,
            reward: Tensor::zeros(4, DType::F32, &Device::Cpu)?,
            next_state: Tensor::zeros((4, STATE_DIM + 1), DType::F32, &Device::Cpu)?,
            gamma_not_done: Tensor::zeros(4, DType::F32, &Device::Cpu)?,
        };
        assert!(agent.update_actor(&t).is_err());
        assert!(agent.critic.is_trainable());
        Ok(())
    }

    #[test]
    fn test_bellman_target() -> Result<()> {
        let agent = agent()?;

        // Terminal transitions: the target is the reward itself.
        let b = batch(8, true)?;
        let t = agent.batch_tensors(&b)?;
        assert_eq!(agent.bellman_target(&t)?.to_vec1::<f32>()?, b.rewards().to_vec());

        let b = batch(8, false)?;
        let t = agent.batch_tensors(&b)?;
        let next_q = agent.target.next_q(&t.next_state)?.to_vec1::<f32>()?;
        let tgt = agent.bellman_target(&t)?.to_vec1::<f32>()?;
        for ((tgt, r), q) in tgt.iter().zip(b.rewards()).zip(next_q.iter()) {
            assert!((tgt - (r + 0.99 * q)).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_empty_batch() -> Result<()> {
        let mut agent = agent()?;
        let b = TransitionBatch::from_transitions(&[], STATE_DIM, ACT_DIM)?;
        let err = agent.one_step_update(&b).unwrap_err();
        assert_error(err, |e| *e == DdpgError::EmptyBatch);
        assert_eq!(agent.n_opts(), 0);
        Ok(())
    }

    #[test]
    fn test_batch_shape_mismatch() -> Result<()> {
        let mut agent = agent()?;
        let trs = vec![Transition::new(vec![0.0; 4], vec![0.0; 2], 0.0, vec![0.0; 4], false)];
        let b = TransitionBatch::from_transitions(&trs, 4, 2)?;
        let err = agent.one_step_update(&b).unwrap_err();
        assert_error(err, |e| matches!(e, DdpgError::ShapeMismatch { .. }));
        Ok(())
    }

    #[test]
    fn test_divergence_halts_training() -> Result<()> {
        let mut agent = agent()?;
        let before = snapshot(&agent)?;
        let trs = (0..8)
            .map(|i| transition(i, f32::NAN, false))
            .collect::<Vec<_>>();
        let b = TransitionBatch::from_transitions(&trs, STATE_DIM, ACT_DIM)?;

        let err = agent.one_step_update(&b).unwrap_err();
        assert_error(err, |e| matches!(e, DdpgError::DivergedTraining { .. }));
        assert!(agent.is_diverged());
        assert_eq!(agent.n_opts(), 0);

        // No parameter was touched.
        let after = snapshot(&agent)?;
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.max_abs_diff(a)?, 0.0);
        }

        // Later updates are refused, acting still works.
        let err = agent.one_step_update(&batch(8, false)?).unwrap_err();
        assert_error(err, |e| matches!(e, DdpgError::DivergedTraining { .. }));
        assert_eq!(agent.act(&[0.0, 0.1, 0.2])?.len(), ACT_DIM);
        Ok(())
    }

    #[test]
    fn test_select_action_is_bounded() -> Result<()> {
        let agent = agent()?;
        for state in [[0.0f32, 0.0, 0.0], [1e4, -1e4, 3.0], [-0.5, 0.5, 1e-6]] {
            for _ in 0..20 {
                let act = agent.select_action(&state, 100.0)?;
                assert_eq!(act.len(), ACT_DIM);
                assert!(act.iter().all(|a| a.abs() <= 1.0), "{:?}", act);
            }
        }
        Ok(())
    }

    #[test]
    fn test_zero_noise_is_deterministic() -> Result<()> {
        let agent = agent()?;
        let state = [0.2f32, -0.4, 0.9];
        let a1 = agent.select_action(&state, 0.0)?;
        let a2 = agent.act(&state)?;
        assert_eq!(a1, a2);
        assert_eq!(a1, agent.select_action(&state, 0.0)?);
        Ok(())
    }

    #[test]
    fn test_select_action_rejects_bad_input() -> Result<()> {
        let agent = agent()?;
        let err = agent.select_action(&[0.0; 3], -0.1).unwrap_err();
        assert_error(err, |e| *e == DdpgError::InvalidNoiseScale(-0.1));
        assert!(agent.select_action(&[0.0; 3], f64::NAN).is_err());

        let err = agent.act(&[0.0; 4]).unwrap_err();
        assert_error(err, |e| matches!(e, DdpgError::ShapeMismatch { .. }));
        Ok(())
    }

    #[test]
    fn test_build_rejects_inconsistent_dims() {
        let config = config().critic_config(
            CriticConfig::default().q_config(MlpConfig::new(STATE_DIM, vec![4], 1, false)),
        );
        assert!(Ddpg::<Mlp, Mlp>::build(config).is_err());
    }

    #[test]
    fn test_build_rejects_critic_with_vector_output() {
        let config = config().critic_config(CriticConfig::default().q_config(MlpConfig::new(
            STATE_DIM + ACT_DIM,
            vec![8],
            2,
            false,
        )));
        let err = Ddpg::<Mlp, Mlp>::build(config).err().unwrap();
        assert_error(err, |e| matches!(e, DdpgError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_train_step_warmup() -> Result<()> {
        let mut agent = Ddpg::<Mlp, Mlp>::build(
            config().min_transitions_warmup(10).n_updates_per_opt(3),
        )?;
        let mut buffer = SimpleReplayBuffer::build(
            &SimpleReplayBufferConfig::default()
                .capacity(100)
                .state_dim(STATE_DIM)
                .act_dim(ACT_DIM),
        )?;

        for i in 0..9 {
            buffer.push(transition(i, 0.5, false))?;
            assert!(agent.train_step(&mut buffer)?.is_none());
        }
        buffer.push(transition(9, 0.5, true))?;
        let stats = agent.train_step(&mut buffer)?.unwrap();
        assert!(stats.critic_loss.is_finite());
        assert_eq!(agent.n_opts(), 3);

        let record = Record::from(stats);
        assert_eq!(record.get_scalar("loss_critic")?, stats.critic_loss);
        assert_eq!(record.get_scalar("loss_actor")?, stats.actor_loss);
        Ok(())
    }

    #[test]
    fn test_train_step_on_empty_buffer() -> Result<()> {
        let mut agent = agent()?;
        let mut buffer = SimpleReplayBuffer::build(
            &SimpleReplayBufferConfig::default()
                .capacity(4)
                .state_dim(STATE_DIM)
                .act_dim(ACT_DIM),
        )?;
        let err = agent.train_step(&mut buffer).unwrap_err();
        assert_error(err, |e| *e == DdpgError::EmptyStore);
        Ok(())
    }

    #[test]
    fn test_param_stats() -> Result<()> {
        let agent = agent()?;
        let record = agent.param_stats()?;
        // Three layers with weight and bias, mean and std each.
        assert_eq!(record.len(), 2 * 3 * 2 * 2);
        assert!(record.get_scalar("actor.mlp.ln0.weight_std")? > 0.0);
        Ok(())
    }
}
