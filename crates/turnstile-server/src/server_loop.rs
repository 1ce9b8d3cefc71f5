//! The server loop: message dispatch and turn bookkeeping.
//!
//! [`ServerLoop`] owns the [`Environment`] exclusively (moved in via
//! `thread::spawn`). No locks on the hot path: requests arrive on one
//! crossbeam channel and replies go back on one channel per agent.
//!
//! Each agent is in one of three implicit states:
//!
//! ```text
//!              reset()                     done / interrupted
//! AwaitingReset ──────────> Playing ──────────────────────> AwaitingReset
//!                              │  reset() mid-episode
//!                              └──────────> InterruptPending ──(round completes)──> Playing
//! ```
//!
//! `reset_expected[a]` is set in `AwaitingReset`; `reset_requested[a]` is
//! set while a reset request waits to be answered.

use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::{Receiver, Sender};
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use turnstile_core::{
    check_turn, AgentId, AgentTurn, EnvError, Environment, Info, Message, ProtocolError, Reply,
    Transition, TurnError,
};

use crate::collector::{ActionCollector, Slot};
use crate::stats::ServerStats;

type ReplyOf<E> = Reply<<E as Environment>::Observation, <E as Environment>::Info>;
type TransitionOf<E> = Transition<<E as Environment>::Observation, <E as Environment>::Info>;

/// State held by the server thread.
pub(crate) struct ServerLoop<E: Environment> {
    env: E,
    num_agents: usize,
    incoming: Receiver<Message<E::Action>>,
    outgoing: Vec<Sender<ReplyOf<E>>>,
    collector: ActionCollector<E::Action>,
    /// Observations of the latest reset or step; `None` before the first episode.
    last_observations: Option<Vec<E::Observation>>,
    /// Info records of the latest step; all `None` right after a reset.
    last_details: Vec<Option<E::Info>>,
    reset_expected: Vec<bool>,
    reset_requested: Vec<bool>,
    buffered: Vec<Option<ReplyOf<E>>>,
    /// A request was received and its reply has not been sent yet.
    awaiting: Vec<bool>,
    stats: ServerStats,
}

impl<E: Environment> ServerLoop<E> {
    /// Create the loop state. `outgoing` holds one sender per agent.
    pub fn new(
        env: E,
        incoming: Receiver<Message<E::Action>>,
        outgoing: Vec<Sender<ReplyOf<E>>>,
    ) -> Self {
        let num_agents = env.num_agents();
        debug_assert_eq!(outgoing.len(), num_agents);
        Self {
            env,
            num_agents,
            incoming,
            outgoing,
            collector: ActionCollector::new(),
            last_observations: None,
            last_details: vec![None; num_agents],
            reset_expected: vec![true; num_agents],
            reset_requested: vec![false; num_agents],
            buffered: (0..num_agents).map(|_| None).collect(),
            awaiting: vec![false; num_agents],
            stats: ServerStats::default(),
        }
    }

    /// Main loop. Runs until a `StopServer` message arrives or every
    /// sender is gone.
    ///
    /// Consumes self; dropping the incoming receiver on return releases
    /// any producer still blocked on a bounded queue.
    pub fn run(mut self) -> ServerStats {
        info!(agents = self.num_agents, "turn server started");
        while let Ok(msg) = self.incoming.recv() {
            if self.handle(msg).is_break() {
                break;
            }
        }
        let drained = self.incoming.try_iter().count();
        info!(
            messages = self.stats.messages,
            episodes = self.stats.episodes,
            drained,
            "turn server stopped"
        );
        self.stats
    }

    /// Process one message.
    pub fn handle(&mut self, msg: Message<E::Action>) -> ControlFlow<()> {
        self.stats.messages += 1;

        if let Some(agent) = msg.agent() {
            if agent.index() >= self.num_agents {
                self.stats.protocol_errors += 1;
                let e = ProtocolError::UnknownAgent {
                    agent,
                    num_agents: self.num_agents,
                };
                warn!(error = %e, "dropping message from unknown agent");
                return ControlFlow::Continue(());
            }
            self.awaiting[agent.index()] = true;
        }

        match msg {
            Message::Action { action, agent } => self.on_action(agent, action),
            Message::Reset { agent } => self.on_reset(agent),
            Message::Error { cause } => self.on_error(cause),
            Message::StopServer => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Counters so far.
    #[cfg(test)]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    // ── Message handlers ─────────────────────────────────────────

    fn on_action(&mut self, agent: AgentId, action: E::Action) {
        if self.reset_expected[agent.index()] {
            self.reject(agent, ProtocolError::ResetRequired { agent });
            return;
        }
        if let Err(e) = self.collector.collect(agent, Slot::Action(action)) {
            self.reject(agent, e);
            return;
        }
        if self.collector.all_collected() {
            self.transition();
        }
    }

    fn on_reset(&mut self, agent: AgentId) {
        let i = agent.index();
        if self.reset_expected.iter().all(|&r| r) {
            self.start_episode(agent);
        } else if self.reset_expected[i] {
            self.reset_expected[i] = false;
            self.redeem_or_request(agent);
        } else {
            if let Err(e) = self.collector.collect(agent, Slot::Interrupt) {
                self.reject(agent, e);
                return;
            }
            debug!(agent = %agent, "interrupt requested");
            self.reset_requested[i] = true;
            if self.collector.all_collected() {
                self.transition();
            }
        }
    }

    /// Fail every outstanding request. Agents of the open round may retry;
    /// agents waiting on a later turn or on a reset must reset to resync.
    fn on_error(&mut self, cause: TurnError) {
        warn!(error = %cause, "delivering reported failure to awaiting agents");
        for agent in AgentId::all(self.num_agents) {
            let i = agent.index();
            if !self.awaiting[i] {
                continue;
            }
            if !self.collector.contains(agent) {
                self.reset_expected[i] = true;
            }
            self.deliver(agent, Reply::Error(cause.clone()));
        }
        let turn = self.collector.agent_turn();
        self.collector.reset(turn);
    }

    // ── Episode boundaries ───────────────────────────────────────

    /// Every agent is done: reset the environment on behalf of `agent`.
    fn start_episode(&mut self, agent: AgentId) {
        let (observations, turn) = match self.reset_env() {
            Ok(r) => r,
            Err(e) => {
                warn!(agent = %agent, error = %e, "environment reset failed");
                self.deliver(agent, Reply::Error(e));
                return;
            }
        };
        self.begin_episode(observations, turn);
        debug!(agent = %agent, episode = self.stats.episodes, "episode started");
        self.reset_expected[agent.index()] = false;
        self.redeem_or_request(agent);
    }

    /// Reset the environment and validate what it reports.
    fn reset_env(&mut self) -> Result<(Vec<E::Observation>, AgentTurn), TurnError> {
        let observations = match self.call_env(|env| env.reset()) {
            Ok(o) => o,
            Err(e) => {
                self.stats.env_failures += 1;
                return Err(e.into());
            }
        };
        if observations.len() != self.num_agents {
            self.stats.env_failures += 1;
            let e = EnvError::ShapeMismatch {
                what: "observations",
                got: observations.len(),
                expected: self.num_agents,
            };
            error!(error = %e, "environment broke its reset contract");
            return Err(e.into());
        }
        let turn = self.env.agent_turn();
        if let Err(e) = check_turn(&turn, self.num_agents, false) {
            self.stats.env_failures += 1;
            error!(error = %e, "environment broke its reset contract");
            return Err(e.into());
        }
        Ok((observations, turn))
    }

    /// Install a freshly reset episode: every agent expects a reset and
    /// the agents of `turn` get their first observation buffered.
    fn begin_episode(&mut self, observations: Vec<E::Observation>, turn: AgentTurn) {
        self.stats.episodes += 1;
        self.reset_expected.fill(true);
        self.buffered.iter_mut().for_each(|b| *b = None);
        self.last_details.iter_mut().for_each(|d| *d = None);
        for agent in &turn {
            let obs = observations[agent.index()].clone();
            self.buffered[agent.index()] = Some(Reply::Observation(Transition::initial(obs)));
        }
        self.collector.reset(turn);
        self.last_observations = Some(observations);
    }

    /// Send the agent's buffered reply, or remember that it is waiting.
    fn redeem_or_request(&mut self, agent: AgentId) {
        match self.buffered[agent.index()].take() {
            Some(reply) => {
                debug!(agent = %agent, "redeeming buffered reply");
                self.deliver(agent, reply);
            }
            None => self.reset_requested[agent.index()] = true,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    fn transition(&mut self) {
        if self.collector.is_interrupted() {
            self.interrupt_round();
        } else {
            self.step_round();
        }
    }

    fn interrupt_round(&mut self) {
        let Some(contributors) = self.take_round() else {
            return;
        };

        // Everyone still playing learns the episode ended; interrupters
        // and agents already done know it.
        let terminal: Vec<(AgentId, ReplyOf<E>)> = AgentId::all(self.num_agents)
            .filter(|a| {
                let i = a.index();
                self.awaiting[i] && !self.reset_expected[i] && !self.reset_requested[i]
            })
            .filter_map(|a| self.terminal_reply(a).map(|r| (a, r)))
            .collect();

        let (observations, turn) = match self.reset_env() {
            Ok(r) => r,
            Err(e) => {
                self.round_failed(&contributors, e);
                return;
            }
        };

        self.stats.transitions += 1;
        self.stats.interrupts += 1;
        debug!(notified = terminal.len(), "episode interrupted");
        for (agent, reply) in terminal {
            self.deliver(agent, reply);
        }

        self.begin_episode(observations, turn);
        for agent in AgentId::all(self.num_agents) {
            let i = agent.index();
            if !self.reset_requested[i] {
                continue;
            }
            self.reset_expected[i] = false;
            if let Some(reply) = self.buffered[i].take() {
                self.deliver(agent, reply);
            }
        }
    }

    fn step_round(&mut self) {
        let Some((contributors, actions)) = self.take_actions() else {
            return;
        };

        let outcome = match self.call_env(|env| env.step(actions)) {
            Ok(o) => o,
            Err(e) => {
                self.stats.env_failures += 1;
                self.round_failed(&contributors, e.into());
                return;
            }
        };
        if let Err(e) = outcome.check_shape(self.num_agents) {
            self.contract_violation(e.into());
            return;
        }
        let all_done = outcome.dones.iter().all(|&d| d);
        let turn = self.env.agent_turn();
        if let Err(e) = check_turn(&turn, self.num_agents, all_done) {
            self.contract_violation(e.into());
            return;
        }

        self.stats.transitions += 1;
        let transition = |agent: AgentId| -> TransitionOf<E> {
            let i = agent.index();
            Transition {
                observation: outcome.observations[i].clone(),
                reward: outcome.rewards[i],
                done: outcome.dones[i],
                info: Info {
                    interrupted: false,
                    details: Some(outcome.infos[i].clone()),
                },
            }
        };

        let newly_done: AgentTurn = AgentId::all(self.num_agents)
            .filter(|a| !self.reset_expected[a.index()] && outcome.dones[a.index()])
            .collect();
        for &agent in &newly_done {
            if self.awaiting[agent.index()] {
                self.deliver(agent, Reply::Observation(transition(agent)));
            }
        }
        for (expected, &done) in self.reset_expected.iter_mut().zip(&outcome.dones) {
            *expected |= done;
        }

        self.collector.reset(turn.iter().copied());
        for &agent in turn.iter().filter(|a| !newly_done.contains(*a)) {
            let i = agent.index();
            let reply = Reply::Observation(transition(agent));
            if !self.awaiting[i] {
                // Nothing to answer: hold the reply until the agent resets.
                self.reset_expected[i] = true;
                self.buffered[i] = Some(reply);
            } else if self.reset_requested[i] || !self.reset_expected[i] {
                self.deliver(agent, reply);
            } else {
                self.buffered[i] = Some(reply);
            }
        }

        self.last_details = outcome.infos.into_iter().map(Some).collect();
        self.last_observations = Some(outcome.observations);
    }

    /// Move the completed round out of the collector, reopening it.
    fn take_round(&mut self) -> Option<AgentTurn> {
        match self.collector.take_actions() {
            Ok(taken) => Some(taken.keys().copied().collect()),
            Err(e) => {
                error!(error = %e, "transition attempted on an incomplete round");
                None
            }
        }
    }

    /// Like [`take_round`](Self::take_round), also returning the actions
    /// in round order.
    fn take_actions(&mut self) -> Option<(AgentTurn, Vec<E::Action>)> {
        let taken = match self.collector.take_actions() {
            Ok(taken) => taken,
            Err(e) => {
                error!(error = %e, "transition attempted on an incomplete round");
                return None;
            }
        };
        let mut contributors = SmallVec::with_capacity(taken.len());
        let mut actions = Vec::with_capacity(taken.len());
        for (agent, slot) in taken {
            contributors.push(agent);
            if let Slot::Action(a) = slot {
                actions.push(a);
            }
        }
        Some((contributors, actions))
    }

    fn terminal_reply(&self, agent: AgentId) -> Option<ReplyOf<E>> {
        let i = agent.index();
        let observation = self.last_observations.as_ref()?.get(i)?.clone();
        Some(Reply::Observation(Transition {
            observation,
            reward: 0.0,
            done: true,
            info: Info {
                interrupted: true,
                details: self.last_details[i].clone(),
            },
        }))
    }

    // ── Failures ─────────────────────────────────────────────────

    /// The environment rejected the round. Its state is unchanged, so the
    /// round stays open for the same agents and each contributor may retry.
    fn round_failed(&mut self, contributors: &[AgentId], e: TurnError) {
        warn!(error = %e, agents = ?contributors, "environment failed; round reopened");
        for &agent in contributors {
            self.deliver(agent, Reply::Error(e.clone()));
        }
    }

    /// The environment returned something unusable after mutating its
    /// state. The episode is abandoned: every waiting agent gets the error
    /// and the next reset starts over.
    fn contract_violation(&mut self, e: TurnError) {
        self.stats.env_failures += 1;
        error!(error = %e, "environment broke its step contract; abandoning episode");
        for agent in AgentId::all(self.num_agents) {
            if self.awaiting[agent.index()] {
                self.deliver(agent, Reply::Error(e.clone()));
            }
        }
        self.reset_expected.fill(true);
        self.buffered.iter_mut().for_each(|b| *b = None);
        self.collector.reset(std::iter::empty());
    }

    fn reject(&mut self, agent: AgentId, e: ProtocolError) {
        self.stats.protocol_errors += 1;
        warn!(agent = %agent, error = %e, "protocol violation");
        self.deliver(agent, Reply::Error(e.into()));
    }

    // ── Plumbing ─────────────────────────────────────────────────

    /// Answer the agent's outstanding request.
    fn deliver(&mut self, agent: AgentId, reply: ReplyOf<E>) {
        let i = agent.index();
        self.awaiting[i] = false;
        self.reset_requested[i] = false;
        if self.outgoing[i].send(reply).is_err() {
            debug!(agent = %agent, "client gone; reply dropped");
        }
    }

    /// Call into the environment, turning a panic into an error.
    fn call_env<T>(
        &mut self,
        f: impl FnOnce(&mut E) -> Result<T, EnvError>,
    ) -> Result<T, EnvError> {
        let env = &mut self.env;
        match panic::catch_unwind(AssertUnwindSafe(move || f(env))) {
            Ok(result) => result,
            Err(payload) => Err(EnvError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}
