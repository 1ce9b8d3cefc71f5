//! Tic-tac-toe on an N×N board.
//!
//! Agent 0 moves first; agents alternate. A line (row, column, or either
//! diagonal) of N marks wins. Rewards are +1 for the winner and -1 for the
//! loser on the final step, 0 otherwise. Both agents see the full board.

use smallvec::smallvec;
use turnstile_core::{AgentId, AgentTurn, EnvError, Environment, StepOutcome};

/// Marker for an empty cell.
pub const EMPTY: i8 = -1;

/// Board as seen by the agents: `board[row][col]` is [`EMPTY`] or the ID
/// of the agent that marked the cell.
pub type Board = Vec<Vec<i8>>;

/// Per-agent info returned by [`TicTacToe::step`](Environment::step).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicTacToeInfo {
    /// The winning agent, once there is one.
    pub winner: Option<AgentId>,
    /// Cells of the winning line; empty unless there is a winner.
    pub winning_line: Vec<(usize, usize)>,
    /// The board filled up without a winner.
    pub draw: bool,
}

/// Two-agent tic-tac-toe.
#[derive(Clone, Debug)]
pub struct TicTacToe {
    size: usize,
    board: Board,
    turn: AgentId,
    empty: usize,
    info: TicTacToeInfo,
}

impl TicTacToe {
    /// A fresh game on a `size`×`size` board. Sizes below 1 are raised to 1.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            board: vec![vec![EMPTY; size]; size],
            turn: AgentId(0),
            empty: size * size,
            info: TicTacToeInfo::default(),
        }
    }

    /// Side length of the board.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Whether the game has ended (win or draw).
    pub fn is_over(&self) -> bool {
        self.info.winner.is_some() || self.info.draw
    }

    /// Check the lines through `(row, col)` for a win by `mark`.
    fn winning_line(&self, row: usize, col: usize, mark: i8) -> Option<Vec<(usize, usize)>> {
        let n = self.size;
        let mut lines: Vec<Vec<(usize, usize)>> = vec![
            (0..n).map(|i| (row, i)).collect(),
            (0..n).map(|i| (i, col)).collect(),
        ];
        if row == col {
            lines.push((0..n).map(|i| (i, i)).collect());
        }
        if row + col == n - 1 {
            lines.push((0..n).map(|i| (i, n - 1 - i)).collect());
        }
        lines
            .into_iter()
            .find(|line| line.iter().all(|&(r, c)| self.board[r][c] == mark))
    }

    fn rewards(&self) -> Vec<f64> {
        match self.info.winner {
            Some(w) => (0..2).map(|a| if a == w.index() { 1.0 } else { -1.0 }).collect(),
            None => vec![0.0; 2],
        }
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Environment for TicTacToe {
    type Observation = Board;
    type Action = (usize, usize);
    type Info = TicTacToeInfo;

    fn num_agents(&self) -> usize {
        2
    }

    fn agent_turn(&self) -> AgentTurn {
        smallvec![self.turn]
    }

    fn reset(&mut self) -> Result<Vec<Board>, EnvError> {
        *self = Self::new(self.size);
        Ok(vec![self.board.clone(); 2])
    }

    fn step(
        &mut self,
        actions: Vec<(usize, usize)>,
    ) -> Result<StepOutcome<Board, TicTacToeInfo>, EnvError> {
        let &[(row, col)] = actions.as_slice() else {
            return Err(EnvError::ShapeMismatch {
                what: "actions",
                got: actions.len(),
                expected: 1,
            });
        };
        if self.is_over() {
            return Err(EnvError::IllegalAction {
                reason: "the game is over".into(),
            });
        }
        if row >= self.size || col >= self.size {
            return Err(EnvError::IllegalAction {
                reason: format!("cell ({row}, {col}) is off the {0}x{0} board", self.size),
            });
        }
        if self.board[row][col] != EMPTY {
            return Err(EnvError::IllegalAction {
                reason: format!("cell ({row}, {col}) is not empty"),
            });
        }

        let mark = self.turn.0 as i8;
        self.board[row][col] = mark;
        self.empty -= 1;
        if let Some(line) = self.winning_line(row, col, mark) {
            self.info.winner = Some(self.turn);
            self.info.winning_line = line;
        } else if self.empty == 0 {
            self.info.draw = true;
        }
        self.turn = AgentId((self.turn.0 + 1) % 2);

        let done = self.is_over();
        Ok(StepOutcome {
            observations: vec![self.board.clone(); 2],
            rewards: self.rewards(),
            dones: vec![done; 2],
            infos: vec![self.info.clone(); 2],
        })
    }
}
