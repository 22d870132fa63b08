//! Per-frame ball ownership.

use crate::domain::{PlayerSeries, Point};

/// Resolve the ball owner for every frame.
///
/// `active_from[i]` is the first frame at which `players[i]` is tracked.
/// The owner is the tracked player nearest to the ball (squared image
/// distance); ties keep the previous owner. With nobody tracked the previous
/// owner carries over, or the smallest player id before any owner exists.
pub fn resolve_owners(players: &[PlayerSeries], active_from: &[usize], ball: &[Point]) -> Vec<String> {
    let fallback = players.iter().map(|p| p.id.as_str()).min().unwrap_or_default();
    let mut owners: Vec<String> = Vec::with_capacity(ball.len());
    let mut last: Option<&str> = None;

    for (frame, ball_pos) in ball.iter().enumerate() {
        let mut best: Option<(&str, f64)> = None;

        for (player, &from) in players.iter().zip(active_from) {
            if from > frame {
                continue;
            }
            let Some(pos) = player.positions.get(frame) else {
                continue;
            };
            let dist = pos.distance_sq(ball_pos);
            let better = match best {
                None => true,
                Some((_, best_dist)) => {
                    dist < best_dist || (dist == best_dist && last == Some(player.id.as_str()))
                }
            };
            if better {
                best = Some((player.id.as_str(), dist));
            }
        }

        let owner = match best {
            Some((id, _)) => id,
            None => last.unwrap_or(fallback),
        };
        last = Some(owner);
        owners.push(owner.to_string());
    }

    owners
}
