//! Combat resolver - turns contact events into damage

use uuid::Uuid;

use crate::game::tuning::Tuning;
use crate::ws::protocol::PartName;

/// A contact between two parts, tagged with their owning players.
/// Built by the room from the physics contact list and its side table.
#[derive(Debug, Clone, Copy)]
pub struct PartContact {
    pub owner_a: Uuid,
    pub part_a: PartName,
    pub owner_b: Uuid,
    pub part_b: PartName,
    /// Relative speed of the two bodies at contact time (px/s)
    pub relative_speed: f32,
}

/// A qualifying strike: the victim loses `damage` health
#[derive(Debug, Clone, Copy)]
pub struct Strike {
    pub attacker: Uuid,
    pub victim: Uuid,
    pub target_part: PartName,
    pub damage: i32,
}

/// Applies the game rules for which contacts count as strikes
pub struct CombatResolver {
    min_impact_speed: f32,
    damage_scale: f32,
    max_hit_damage: i32,
    vital_chest: bool,
    vital_pelvis: bool,
}

impl CombatResolver {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            min_impact_speed: tuning.min_impact_speed,
            damage_scale: tuning.damage_scale,
            max_hit_damage: tuning.max_hit_damage,
            vital_chest: tuning.vital_chest,
            vital_pelvis: tuning.vital_pelvis,
        }
    }

    /// Parts whose contact with a striking part costs health
    fn is_vital(&self, part: PartName) -> bool {
        match part {
            PartName::Head => true,
            PartName::Chest => self.vital_chest,
            PartName::Pelvis => self.vital_pelvis,
            _ => false,
        }
    }

    /// Resolve one contact into an optional strike.
    ///
    /// Self-contact never damages: a ragdoll's own limbs touch all the
    /// time. Resting contact below the impact threshold is discarded.
    pub fn resolve(&self, contact: &PartContact) -> Option<Strike> {
        if contact.owner_a == contact.owner_b {
            return None;
        }

        if contact.relative_speed < self.min_impact_speed {
            return None;
        }

        let (attacker, victim, target_part) =
            if contact.part_a.is_striking() && self.is_vital(contact.part_b) {
                (contact.owner_a, contact.owner_b, contact.part_b)
            } else if contact.part_b.is_striking() && self.is_vital(contact.part_a) {
                (contact.owner_b, contact.owner_a, contact.part_a)
            } else {
                return None;
            };

        let damage = ((contact.relative_speed * self.damage_scale).round() as i32)
            .min(self.max_hit_damage);
        if damage < 1 {
            return None;
        }

        Some(Strike {
            attacker,
            victim,
            target_part,
            damage,
        })
    }

    /// Apply damage to health, returns (new_health, knocked_out).
    ///
    /// Health never goes below zero, and a player already at zero takes
    /// no further damage.
    pub fn apply_damage(current_health: i32, damage: i32) -> (i32, bool) {
        if current_health <= 0 {
            return (0, false);
        }
        let new_health = (current_health - damage).max(0);
        (new_health, new_health == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> CombatResolver {
        CombatResolver::new(&Tuning::default())
    }

    fn contact(
        owner_a: Uuid,
        part_a: PartName,
        owner_b: Uuid,
        part_b: PartName,
        relative_speed: f32,
    ) -> PartContact {
        PartContact {
            owner_a,
            part_a,
            owner_b,
            part_b,
            relative_speed,
        }
    }

    #[test]
    fn self_contact_never_damages() {
        let resolver = resolver();
        let player = Uuid::new_v4();
        for &a in PartName::ALL.iter() {
            for &b in PartName::ALL.iter() {
                let c = contact(player, a, player, b, 10_000.0);
                assert!(resolver.resolve(&c).is_none(), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn hand_to_head_is_a_strike_both_directions() {
        let resolver = resolver();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let strike = resolver
            .resolve(&contact(a, PartName::HandR, b, PartName::Head, 400.0))
            .expect("hand to head must strike");
        assert_eq!(strike.attacker, a);
        assert_eq!(strike.victim, b);

        // Same pair with roles swapped in the event ordering
        let strike = resolver
            .resolve(&contact(b, PartName::Head, a, PartName::FootL, 400.0))
            .expect("foot to head must strike");
        assert_eq!(strike.attacker, a);
        assert_eq!(strike.victim, b);
    }

    #[test]
    fn non_vital_contact_is_ignored() {
        let resolver = resolver();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // Hand to hand, chest to chest: nobody strikes
        assert!(resolver
            .resolve(&contact(a, PartName::HandL, b, PartName::HandR, 500.0))
            .is_none());
        assert!(resolver
            .resolve(&contact(a, PartName::Chest, b, PartName::Chest, 500.0))
            .is_none());
        // Pelvis is only vital when configured
        assert!(resolver
            .resolve(&contact(a, PartName::HandL, b, PartName::Pelvis, 500.0))
            .is_none());
    }

    #[test]
    fn torso_vitality_follows_tuning() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // Chest is vital by default
        assert!(resolver()
            .resolve(&contact(a, PartName::HandL, b, PartName::Chest, 500.0))
            .is_some());

        let tuning = Tuning {
            vital_chest: false,
            vital_pelvis: true,
            ..Tuning::default()
        };
        let resolver = CombatResolver::new(&tuning);
        assert!(resolver
            .resolve(&contact(a, PartName::HandL, b, PartName::Chest, 500.0))
            .is_none());
        assert!(resolver
            .resolve(&contact(a, PartName::FootR, b, PartName::Pelvis, 500.0))
            .is_some());
    }

    #[test]
    fn slow_contact_is_incidental() {
        let resolver = resolver();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = contact(a, PartName::HandR, b, PartName::Head, 10.0);
        assert!(resolver.resolve(&c).is_none());
    }

    #[test]
    fn damage_is_clamped_to_max_per_hit() {
        let tuning = Tuning::default();
        let resolver = resolver();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = contact(a, PartName::FootR, b, PartName::Head, 1_000_000.0);
        let strike = resolver.resolve(&c).unwrap();
        assert_eq!(strike.damage, tuning.max_hit_damage);
    }

    #[test]
    fn damage_scales_with_impact_speed() {
        let resolver = resolver();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let slow = resolver
            .resolve(&contact(a, PartName::HandL, b, PartName::Head, 150.0))
            .unwrap();
        let fast = resolver
            .resolve(&contact(a, PartName::HandL, b, PartName::Head, 400.0))
            .unwrap();
        assert!(fast.damage > slow.damage);
    }

    #[test]
    fn health_floors_at_zero_and_stays_there() {
        let (hp, ko) = CombatResolver::apply_damage(15, 20);
        assert_eq!(hp, 0);
        assert!(ko);

        // Idempotent at the floor
        let (hp, ko) = CombatResolver::apply_damage(0, 20);
        assert_eq!(hp, 0);
        assert!(!ko);
    }

    #[test]
    fn health_is_monotonically_non_increasing() {
        let mut hp = 100;
        for damage in [3, 0, 17, 20, 20, 20, 20, 5] {
            let (next, _) = CombatResolver::apply_damage(hp, damage);
            assert!(next <= hp);
            assert!(next >= 0);
            hp = next;
        }
    }
}
