//! Awalé board rules: sowing, capture, and end-of-game detection.
//!
//! The board is twelve holes of four seeds; holes 0-5 belong to player 0 and
//! holes 6-11 to player 1. Seeds move counter-clockwise. Until the game ends,
//! seeds on the board plus both scores always total 48.

use std::cmp::Ordering;
use std::fmt;

pub const HOLES_PER_PLAYER: usize = 6;
pub const TOTAL_HOLES: usize = 12;
pub const INITIAL_SEEDS: u8 = 4;
pub const TOTAL_SEEDS: u8 = 48;

/// A score strictly above this (more than half of all seeds) wins outright.
pub const WINNING_THRESHOLD: u8 = TOTAL_SEEDS / 2;

/// Final outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Player(usize),
    Draw,
}

/// Why a move was refused. Each variant maps to a distinct user-facing
/// reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    /// Hole index outside the board.
    InvalidHole,
    /// Hole exists but is not owned by the player whose turn it is.
    InvalidMove,
    /// Hole is owned but holds no seeds.
    EmptyHole,
    /// The game has already finished.
    GameOver,
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            MoveError::InvalidHole => "Invalid hole",
            MoveError::InvalidMove => "Invalid move",
            MoveError::EmptyHole => "Empty hole",
            MoveError::GameOver => "Game over",
        };
        write!(f, "{}", reason)
    }
}

impl std::error::Error for MoveError {}

/// Full state of one Awalé game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaleGame {
    holes: [u8; TOTAL_HOLES],
    scores: [u8; 2],
    current: usize,
    over: bool,
    winner: Option<Winner>,
}

impl Default for AwaleGame {
    fn default() -> Self {
        Self::new()
    }
}

impl AwaleGame {
    /// Fresh game: four seeds in every hole, player 0 to move.
    pub fn new() -> Self {
        Self {
            holes: [INITIAL_SEEDS; TOTAL_HOLES],
            scores: [0; 2],
            current: 0,
            over: false,
            winner: None,
        }
    }

    /// Builds a game from an arbitrary mid-game position.
    pub fn from_position(holes: [u8; TOTAL_HOLES], scores: [u8; 2], current: usize) -> Self {
        Self {
            holes,
            scores,
            current: current % 2,
            over: false,
            winner: None,
        }
    }

    pub fn holes(&self) -> &[u8; TOTAL_HOLES] {
        &self.holes
    }

    pub fn scores(&self) -> &[u8; 2] {
        &self.scores
    }

    pub fn current_player(&self) -> usize {
        self.current
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    /// Picks which side moves first. Only meaningful before the first move.
    pub fn set_starting_player(&mut self, side: usize) {
        self.current = side % 2;
    }

    /// Whether `hole` is a move the current player may make right now.
    pub fn is_legal(&self, hole: usize) -> bool {
        self.validate(hole).is_ok()
    }

    fn validate(&self, hole: usize) -> Result<(), MoveError> {
        if self.over {
            return Err(MoveError::GameOver);
        }
        if hole >= TOTAL_HOLES {
            return Err(MoveError::InvalidHole);
        }
        let start = self.current * HOLES_PER_PLAYER;
        if hole < start || hole >= start + HOLES_PER_PLAYER {
            return Err(MoveError::InvalidMove);
        }
        if self.holes[hole] == 0 {
            return Err(MoveError::EmptyHole);
        }
        Ok(())
    }

    /// Plays `hole` for the current player.
    ///
    /// Sows the hole's seeds forward one at a time, skipping the source hole
    /// itself on a full lap, then walks backward from the landing hole
    /// capturing opponent holes that now hold exactly two or three seeds.
    /// The turn switches after every accepted move; a rejected move leaves
    /// the board untouched.
    pub fn play_move(&mut self, hole: usize) -> Result<(), MoveError> {
        self.validate(hole)?;

        let mover = self.current;
        let mut seeds = self.holes[hole];
        self.holes[hole] = 0;
        let mut current = hole;

        while seeds > 0 {
            current = (current + 1) % TOTAL_HOLES;
            if current != hole {
                self.holes[current] += 1;
                seeds -= 1;
            }
        }

        // Capture: from the landing hole, walk backward over opponent holes
        // holding exactly 2 or 3 seeds.
        let opponent = 1 - mover;
        let opp_start = opponent * HOLES_PER_PLAYER;
        let opp_end = opp_start + HOLES_PER_PLAYER;
        while current >= opp_start
            && current < opp_end
            && (self.holes[current] == 2 || self.holes[current] == 3)
        {
            self.scores[mover] += self.holes[current];
            self.holes[current] = 0;
            current = (current + TOTAL_HOLES - 1) % TOTAL_HOLES;
        }

        self.current = opponent;
        self.check_end();
        Ok(())
    }

    fn check_end(&mut self) {
        for side in 0..2 {
            if self.scores[side] > WINNING_THRESHOLD {
                self.over = true;
                self.winner = Some(Winner::Player(side));
                return;
            }
        }

        // The side about to move has no seeds left: each side sweeps its own
        // remaining holes into its own score.
        let start = self.current * HOLES_PER_PLAYER;
        let starved = self.holes[start..start + HOLES_PER_PLAYER]
            .iter()
            .all(|&s| s == 0);
        if !starved {
            return;
        }

        for side in 0..2 {
            let base = side * HOLES_PER_PLAYER;
            for hole in base..base + HOLES_PER_PLAYER {
                self.scores[side] += self.holes[hole];
                self.holes[hole] = 0;
            }
        }

        self.over = true;
        self.winner = Some(match self.scores[0].cmp(&self.scores[1]) {
            Ordering::Greater => Winner::Player(0),
            Ordering::Less => Winner::Player(1),
            Ordering::Equal => Winner::Draw,
        });
    }

    /// Forfeits the game for `loser`: the opponent is credited every seed
    /// still on the board, both sides included. This is a harsher rule than
    /// the natural end-game sweep, where each side keeps its own holes.
    pub fn give_up(&mut self, loser: usize) {
        let opponent = 1 - (loser % 2);
        let remaining: u8 = self.holes.iter().sum();
        self.scores[opponent] += remaining;
        self.holes = [0; TOTAL_HOLES];
        self.over = true;
        self.winner = Some(Winner::Player(opponent));
    }

    /// Renders the board, scores, and turn/outcome line as text.
    ///
    /// Player 1's row is drawn on top with hole indices descending, player
    /// 0's below with indices ascending, matching the counter-clockwise seed
    /// flow. This string is the GAME_STATE payload sent to clients.
    pub fn render(&self, player0: &str, player1: &str) -> String {
        let top_label = format!("{}:  ", player1);
        let bottom_label = format!("{}:  ", player0);
        let width = top_label.len().max(bottom_label.len());

        let mut out = String::new();
        out.push('\n');

        out.push_str(&" ".repeat(width));
        for i in (HOLES_PER_PLAYER..TOTAL_HOLES).rev() {
            out.push_str(&format!(" {:2}  ", i));
        }
        out.push('\n');

        out.push_str(&format!("{:<width$}", top_label, width = width));
        for i in (HOLES_PER_PLAYER..TOTAL_HOLES).rev() {
            out.push_str(&format!("[{:2}] ", self.holes[i]));
        }
        out.push_str(&format!("  Score: {}\n", self.scores[1]));

        out.push_str(&format!("{:<width$}", bottom_label, width = width));
        for i in 0..HOLES_PER_PLAYER {
            out.push_str(&format!("[{:2}] ", self.holes[i]));
        }
        out.push_str(&format!("  Score: {}\n", self.scores[0]));

        out.push_str(&" ".repeat(width));
        for i in 0..HOLES_PER_PLAYER {
            out.push_str(&format!(" {:2}  ", i));
        }
        out.push('\n');

        if self.over {
            match self.winner {
                Some(Winner::Player(0)) => {
                    out.push_str(&format!("\nGAME OVER! Winner: {}\n", player0))
                }
                Some(Winner::Player(_)) => {
                    out.push_str(&format!("\nGAME OVER! Winner: {}\n", player1))
                }
                _ => out.push_str("\nGAME OVER! Draw!\n"),
            }
        } else {
            let name = if self.current == 0 { player0 } else { player1 };
            out.push_str(&format!("\nCurrent player: {}\n", name));
        }
        out
    }
}
