//! Network interfaces the actor and the critic are generic over.
//!
//! A model only holds the tensors it reads through a [`VarBuilder`]. The
//! [`VarMap`] behind it belongs to the [`Actor`] or [`Critic`] wrapping the
//! model, which builds its optimizer over those variables and copies them
//! into the target network.
//!
//! [`VarMap`]: candle_nn::VarMap
//! [`Actor`]: crate::ddpg::Actor
//! [`Critic`]: crate::ddpg::Critic
use anyhow::Result;
use candle_nn::VarBuilder;

/// A model with a single input, such as the policy `state -> action`.
pub trait SubModel1 {
    type Config;
    type Input;
    type Output;

    /// Creates the variables of the model under `vb`.
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;
}

/// A model with two inputs, such as the action-value `(state, action) -> q`.
pub trait SubModel2 {
    type Config;

    /// First input, the state for a critic.
    type Input1;

    /// Second input, the action for a critic.
    type Input2;

    type Output;

    /// Creates the variables of the model under `vb`.
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Result<Self::Output>;
}
