use crate::error::{Error, Result};
use crate::game::{FEATURE_COUNT, Game, GameState};
use crate::nn::Network;
use crate::pos::Dir;

/// The first four network outputs map to up, down, left, right.
pub const DIRECTION_OUTPUTS: usize = 4;

/// Argmax over the direction outputs. Only a strictly greater value replaces
/// the running maximum, so ties keep the lower index.
pub fn decide_direction(outputs: &[f64]) -> Dir {
    let mut best = Dir::Up;
    let Some(&first) = outputs.first() else {
        return best;
    };
    let mut max = first;
    for (&d, &v) in Dir::ALL.iter().zip(outputs).skip(1) {
        if v > max {
            max = v;
            best = d;
        }
    }
    best
}

/// Features -> forward pass -> heading -> one game update.
pub fn step_with_network(game: &mut Game, net: &Network) -> Result<()> {
    let inputs = game.parameters()?;
    let outputs = net.forward(&inputs)?;
    game.set_direction(decide_direction(&outputs));
    game.update();
    Ok(())
}

/// Checks that a network can drive the game: one input per feature and at
/// least one output per direction.
pub fn check_controller(net: &Network) -> Result<()> {
    if net.input_size() != FEATURE_COUNT {
        return Err(Error::InputLength {
            expected: FEATURE_COUNT,
            actual: net.input_size(),
        });
    }
    let outputs = net.layer_sizes().last().copied().unwrap_or(0);
    if outputs < DIRECTION_OUTPUTS {
        return Err(Error::InvalidConfig(format!(
            "controller needs {DIRECTION_OUTPUTS} outputs, network has {outputs}"
        )));
    }
    Ok(())
}

/// Lets a trained network play continuously, starting a new episode after
/// every terminal state. A presentation layer polls [`Player::game`] each tick.
pub struct Player {
    game: Game,
    net: Network,
    episodes: usize,
    best_score: usize,
}

impl Player {
    pub fn new(net: Network, width: u16, height: u16, seed: u64) -> Result<Self> {
        check_controller(&net)?;
        Ok(Self {
            game: Game::new(width, height, seed)?,
            net,
            episodes: 0,
            best_score: 0,
        })
    }

    /// Advances one move and returns the state reached. When that state is
    /// terminal the game has already been reset for the next episode.
    pub fn tick(&mut self) -> Result<GameState> {
        step_with_network(&mut self.game, &self.net)?;
        let state = self.game.state();
        if state.is_terminal() {
            self.episodes += 1;
            self.best_score = self.best_score.max(self.game.score());
            self.game.reset();
        }
        Ok(state)
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    pub fn best_score(&self) -> usize {
        self.best_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Activation;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_decide_direction_argmax() {
        assert_eq!(decide_direction(&[0.9, 0.1, 0.2, 0.3]), Dir::Up);
        assert_eq!(decide_direction(&[0.1, 0.9, 0.2, 0.3]), Dir::Down);
        assert_eq!(decide_direction(&[0.1, 0.2, 0.9, 0.3]), Dir::Left);
        assert_eq!(decide_direction(&[0.1, 0.2, 0.3, 0.9]), Dir::Right);
        // extra outputs are ignored
        assert_eq!(decide_direction(&[0.1, 0.2, 0.3, 0.4, 9.0]), Dir::Right);
    }

    #[test]
    fn test_decide_direction_ties_keep_lower_index() {
        assert_eq!(decide_direction(&[0.5, 0.5, 0.5, 0.5]), Dir::Up);
        assert_eq!(decide_direction(&[0.1, 0.7, 0.7, 0.2]), Dir::Down);
        assert_eq!(decide_direction(&[]), Dir::Up);
    }

    fn controller(seed: u64) -> Network {
        let mut rng = SmallRng::seed_from_u64(seed);
        Network::new(&[FEATURE_COUNT, 8, DIRECTION_OUTPUTS], &mut rng).unwrap()
    }

    #[test]
    fn test_check_controller() {
        assert!(check_controller(&controller(1)).is_ok());

        let mut rng = SmallRng::seed_from_u64(1);
        let narrow = Network::new(&[FEATURE_COUNT, 8, 3], &mut rng).unwrap();
        assert!(matches!(check_controller(&narrow), Err(Error::InvalidConfig(_))));
        let wrong_input = Network::new(&[5, 8, 4], &mut rng).unwrap();
        assert!(matches!(
            check_controller(&wrong_input),
            Err(Error::InputLength { .. })
        ));
    }

    #[test]
    fn test_step_follows_network_choice() {
        // zero weights, output biases favour Left
        let layers = [FEATURE_COUNT, 2, DIRECTION_OUTPUTS];
        let mut params = vec![0.0; Network::parameter_count_for(&layers)];
        let n = params.len();
        params[n - 4..].copy_from_slice(&[0.0, 0.0, 5.0, 0.0]);
        let net = Network::from_parameters(&layers, &[Activation::Relu, Activation::Identity], &params)
            .unwrap();

        let mut game = Game::new(10, 10, 4).unwrap();
        let head = game.head();
        step_with_network(&mut game, &net).unwrap();
        assert_eq!(game.direction(), Dir::Left);
        assert_eq!(game.head(), head.step(Dir::Left));
    }

    #[test]
    fn test_player_keeps_playing_across_episodes() {
        let mut player = Player::new(controller(2), 10, 10, 8).unwrap();
        let mut terminal = 0;
        for _ in 0..2_000 {
            if player.tick().unwrap().is_terminal() {
                terminal += 1;
            }
            assert_eq!(player.game().state(), GameState::Running);
        }
        assert_eq!(player.episodes(), terminal);
        assert!(terminal > 0);
    }
}
