//! Ragdoll model - part layout and connective constraints
//!
//! Pure structure description; the physics adapter turns a blueprint
//! into bodies and joints, and the room owns the resulting handles.

use crate::ws::protocol::{PartName, Point};

impl PartName {
    /// All parts of a stickman, in a stable order
    pub const ALL: [PartName; 11] = [
        PartName::Head,
        PartName::Chest,
        PartName::Pelvis,
        PartName::ArmL,
        PartName::ArmR,
        PartName::HandL,
        PartName::HandR,
        PartName::LegL,
        PartName::LegR,
        PartName::FootL,
        PartName::FootR,
    ];

    /// Parts that can deal damage on contact
    pub fn is_striking(self) -> bool {
        matches!(
            self,
            PartName::HandL | PartName::HandR | PartName::FootL | PartName::FootR
        )
    }
}

/// One part of a ragdoll blueprint, positioned relative to the head
#[derive(Debug, Clone, Copy)]
pub struct PartDef {
    pub name: PartName,
    pub offset: Point,
}

/// A soft constraint between two parts (rest length from the blueprint
/// layout, stiffness and damping from tuning)
#[derive(Debug, Clone, Copy)]
pub struct ConstraintDef {
    pub a: PartName,
    pub b: PartName,
    pub rest_length: f32,
}

/// Blueprint of a stickman: parts plus the constraint tree rooted at
/// the chest. Constraint membership never changes after creation.
#[derive(Debug, Clone)]
pub struct RagdollBlueprint {
    pub parts: Vec<PartDef>,
    pub constraints: Vec<ConstraintDef>,
}

impl RagdollBlueprint {
    /// The standard stickman layout
    pub fn standard() -> Self {
        let parts = vec![
            part(PartName::Head, 0.0, 0.0),
            part(PartName::Chest, 0.0, 30.0),
            part(PartName::Pelvis, 0.0, 60.0),
            part(PartName::ArmL, -20.0, 30.0),
            part(PartName::ArmR, 20.0, 30.0),
            part(PartName::HandL, -40.0, 30.0),
            part(PartName::HandR, 40.0, 30.0),
            part(PartName::LegL, -10.0, 80.0),
            part(PartName::LegR, 10.0, 80.0),
            part(PartName::FootL, -20.0, 100.0),
            part(PartName::FootR, 20.0, 100.0),
        ];

        // Tree rooted at the chest: limbs hang off the chest and pelvis
        let edges = [
            (PartName::Chest, PartName::Head),
            (PartName::Chest, PartName::Pelvis),
            (PartName::Chest, PartName::ArmL),
            (PartName::Chest, PartName::ArmR),
            (PartName::ArmL, PartName::HandL),
            (PartName::ArmR, PartName::HandR),
            (PartName::Pelvis, PartName::LegL),
            (PartName::Pelvis, PartName::LegR),
            (PartName::LegL, PartName::FootL),
            (PartName::LegR, PartName::FootR),
        ];

        let offset_of = |name: PartName| {
            parts
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.offset)
                .unwrap_or_default()
        };

        let constraints = edges
            .iter()
            .map(|&(a, b)| {
                let oa = offset_of(a);
                let ob = offset_of(b);
                let dx = ob.x - oa.x;
                let dy = ob.y - oa.y;
                ConstraintDef {
                    a,
                    b,
                    rest_length: (dx * dx + dy * dy).sqrt(),
                }
            })
            .collect();

        Self { parts, constraints }
    }
}

fn part(name: PartName, x: f32, y: f32) -> PartDef {
    PartDef {
        name,
        offset: Point::new(x, y),
    }
}
