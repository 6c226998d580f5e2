//! Deterministic planar ball integrator
//!
//! A small [`Physics`] backend for headless sessions and tests:
//! - linear damping plus constant rolling resistance
//! - spin slaved to rolling speed
//! - cushion bounce with restitution, or a rail jump when hit too hard
//! - equal-mass ball collisions
//!
//! Everything happens in the table plane (XZ). Ball centers stay at one
//! radius above the bed; the vertical part of an impulse goes into the bed.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::table::{BallRole, ContactTarget, CushionProbe, Physics, PhysicsEvent};
use crate::consts::{BALL_MASS, BALL_RADIUS, RAIL_HEIGHT};

/// Tolerance for "resting against a cushion"
const CUSHION_TOUCH_EPSILON: f32 = 0.005;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicConfig {
    /// Half sizes of the playing surface (x, z)
    pub half_extents: Vec2,
    pub ball_radius: f32,
    pub ball_mass: f32,
    /// Proportional slow-down per second
    pub linear_damping: f32,
    /// Constant slow-down (units/s²)
    pub rolling_deceleration: f32,
    pub cushion_restitution: f32,
    pub ball_restitution: f32,
    /// Normal speed into a cushion above which the ball leaves the table
    pub jump_speed: f32,
    /// Cushion depth behind the playing edge
    pub rail_width: f32,
}

impl Default for KinematicConfig {
    fn default() -> Self {
        Self {
            half_extents: Vec2::new(2.25, 4.45),
            ball_radius: BALL_RADIUS,
            ball_mass: BALL_MASS,
            linear_damping: 0.25,
            rolling_deceleration: 0.6,
            cushion_restitution: 0.85,
            ball_restitution: 0.95,
            jump_speed: 18.0,
            rail_width: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Body {
    position: Vec3,
    rotation: Quat,
    linear: Vec3,
    angular: Vec3,
}

impl Body {
    fn at_rest(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
        }
    }
}

/// Velocity after bouncing off a surface with inward `normal`
#[inline]
pub fn bounce(vel: Vec3, normal: Vec3, restitution: f32) -> Vec3 {
    vel - (1.0 + restitution) * vel.dot(normal) * normal
}

/// Does segment `a`-`b` pass through the box `min`-`max`? (slab test)
pub fn segment_hits_box(a: Vec3, b: Vec3, min: Vec3, max: Vec3) -> bool {
    let d = b - a;
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    for axis in 0..3 {
        if d[axis].abs() < 1e-8 {
            if a[axis] < min[axis] || a[axis] > max[axis] {
                return false;
            }
            continue;
        }
        let inv = 1.0 / d[axis];
        let mut ta = (min[axis] - a[axis]) * inv;
        let mut tb = (max[axis] - a[axis]) * inv;
        if ta > tb {
            std::mem::swap(&mut ta, &mut tb);
        }
        t0 = t0.max(ta);
        t1 = t1.min(tb);
        if t0 > t1 {
            return false;
        }
    }
    true
}

/// Distance from `p` to segment `a`-`b`
pub fn point_segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let d = b - a;
    let len_sq = d.length_squared();
    if len_sq < 1e-12 {
        return p.distance(a);
    }
    let t = ((p - a).dot(d) / len_sq).clamp(0.0, 1.0);
    p.distance(a + d * t)
}

#[derive(Debug, Clone)]
pub struct KinematicTable {
    config: KinematicConfig,
    bodies: [Body; 3],
}

impl Default for KinematicTable {
    fn default() -> Self {
        Self::new(KinematicConfig::default())
    }
}

impl KinematicTable {
    pub fn new(config: KinematicConfig) -> Self {
        let rest = Body::at_rest(Vec3::new(0.0, config.ball_radius, 0.0));
        Self {
            config,
            bodies: [rest; 3],
        }
    }

    pub fn config(&self) -> &KinematicConfig {
        &self.config
    }

    pub fn rotation(&self, ball: BallRole) -> Quat {
        self.bodies[ball.index()].rotation
    }

    /// Playing-edge limits for ball centers
    fn center_limits(&self) -> Vec2 {
        self.config.half_extents - Vec2::splat(self.config.ball_radius)
    }

    /// Outward normals of the cushions a ball is resting against
    fn touched_cushions(&self, ball: BallRole) -> impl Iterator<Item = Vec3> {
        let p = self.bodies[ball.index()].position;
        let limit = self.center_limits() - Vec2::splat(CUSHION_TOUCH_EPSILON);
        [
            (p.x >= limit.x, Vec3::X),
            (p.x <= -limit.x, Vec3::NEG_X),
            (p.z >= limit.y, Vec3::Z),
            (p.z <= -limit.y, Vec3::NEG_Z),
        ]
        .into_iter()
        .filter_map(|(touching, normal)| touching.then_some(normal))
    }

    fn integrate(&mut self, dt: f32) {
        let radius = self.config.ball_radius;
        for body in &mut self.bodies {
            let speed = body.linear.length();
            if speed > 0.0 {
                let damped = speed * (1.0 - self.config.linear_damping * dt).max(0.0);
                let new_speed = (damped - self.config.rolling_deceleration * dt).max(0.0);
                body.linear *= new_speed / speed;
            }
            body.position += body.linear * dt;
            body.position.y = radius;
            body.angular = Vec3::Y.cross(body.linear) / radius;
            if body.angular.length_squared() > 0.0 {
                body.rotation = (Quat::from_scaled_axis(body.angular * dt) * body.rotation).normalize();
            }
        }
    }

    fn collide_balls(&mut self, contacts: &mut Vec<PhysicsEvent>) {
        let min_dist = 2.0 * self.config.ball_radius;
        let e = self.config.ball_restitution;
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let (a, b) = (self.bodies[i], self.bodies[j]);
            let mut delta = b.position - a.position;
            delta.y = 0.0;
            let dist = delta.length();
            if dist >= min_dist {
                continue;
            }
            let n = if dist > 1e-6 { delta / dist } else { Vec3::X };
            let rel = (b.linear - a.linear).dot(n);

            let push = n * (min_dist - dist) * 0.5;
            self.bodies[i].position -= push;
            self.bodies[j].position += push;

            if rel < 0.0 {
                let dv = 0.5 * (1.0 + e) * rel * n;
                self.bodies[i].linear += dv;
                self.bodies[j].linear -= dv;
                let (bi, bj) = (BallRole::ALL[i], BallRole::ALL[j]);
                contacts.push(PhysicsEvent::Contact {
                    ball: bi,
                    other: ContactTarget::Ball(bj),
                });
                contacts.push(PhysicsEvent::Contact {
                    ball: bj,
                    other: ContactTarget::Ball(bi),
                });
            }
        }
    }

    fn collide_cushions(&mut self, contacts: &mut Vec<PhysicsEvent>, exits: &mut Vec<PhysicsEvent>) {
        let limit = self.center_limits();
        let e = self.config.cushion_restitution;
        for (idx, body) in self.bodies.iter_mut().enumerate() {
            let role = BallRole::ALL[idx];
            // (outward normal, overshoot past the playing edge)
            let sides = [
                (Vec3::X, body.position.x - limit.x),
                (Vec3::NEG_X, -limit.x - body.position.x),
                (Vec3::Z, body.position.z - limit.y),
                (Vec3::NEG_Z, -limit.y - body.position.z),
            ];
            for (outward, overshoot) in sides {
                let into = body.linear.dot(outward);
                if overshoot <= 0.0 || into <= 0.0 {
                    continue;
                }
                if into > self.config.jump_speed {
                    body.position += outward * self.config.rail_width * 2.0;
                    body.position.y = -1.0;
                    body.linear = Vec3::ZERO;
                    body.angular = Vec3::ZERO;
                    exits.push(PhysicsEvent::LeftTable(role));
                    break;
                }
                body.position -= outward * overshoot * 2.0;
                body.linear = bounce(body.linear, -outward, e);
                contacts.push(PhysicsEvent::Contact {
                    ball: role,
                    other: ContactTarget::Cushion,
                });
            }
        }
    }

    /// Rail boxes grown by `margin`
    fn rail_boxes(&self, margin: f32) -> [(Vec3, Vec3); 4] {
        let (hx, hz) = (self.config.half_extents.x, self.config.half_extents.y);
        let w = self.config.rail_width;
        let m = Vec3::splat(margin);
        [
            (Vec3::new(hx, 0.0, -hz - w), Vec3::new(hx + w, RAIL_HEIGHT, hz + w)),
            (Vec3::new(-hx - w, 0.0, -hz - w), Vec3::new(-hx, RAIL_HEIGHT, hz + w)),
            (Vec3::new(-hx - w, 0.0, hz), Vec3::new(hx + w, RAIL_HEIGHT, hz + w)),
            (Vec3::new(-hx - w, 0.0, -hz - w), Vec3::new(hx + w, RAIL_HEIGHT, -hz)),
        ]
        .map(|(min, max)| (min - m, max + m))
    }
}

impl CushionProbe for KinematicTable {
    fn touching_cushion(&self, ball: BallRole) -> bool {
        self.touched_cushions(ball).next().is_some()
    }

    fn touching_cushion_in_direction(&self, ball: BallRole, direction: Vec3) -> bool {
        let flat = Vec3::new(direction.x, 0.0, direction.z);
        if flat.length_squared() <= 0.001 {
            return false;
        }
        let flat = flat.normalize();
        self.touched_cushions(ball).any(|outward| flat.dot(outward) > 0.0)
    }
}

impl Physics for KinematicTable {
    fn apply_impulse(&mut self, ball: BallRole, impulse: Vec3) {
        let body = &mut self.bodies[ball.index()];
        let planar = Vec3::new(impulse.x, 0.0, impulse.z);
        body.linear += planar / self.config.ball_mass;
    }

    fn velocity(&self, ball: BallRole) -> (Vec3, Vec3) {
        let body = &self.bodies[ball.index()];
        (body.linear, body.angular)
    }

    fn set_velocity(&mut self, ball: BallRole, linear: Vec3, angular: Vec3) {
        let body = &mut self.bodies[ball.index()];
        body.linear = linear;
        body.angular = angular;
    }

    fn position(&self, ball: BallRole) -> Vec3 {
        self.bodies[ball.index()].position
    }

    fn teleport(&mut self, ball: BallRole, position: Vec3, rotation: Quat) {
        self.bodies[ball.index()] = Body {
            position,
            rotation,
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
        };
    }

    fn step(&mut self, dt: f32) -> Vec<PhysicsEvent> {
        let mut contacts = Vec::new();
        let mut exits = Vec::new();
        self.integrate(dt);
        self.collide_balls(&mut contacts);
        self.collide_cushions(&mut contacts, &mut exits);
        contacts.extend(exits);
        contacts
    }

    fn is_path_blocked(
        &self,
        ball: BallRole,
        forward: Vec3,
        clearance: f32,
        length: f32,
        radius: f32,
    ) -> bool {
        let forward = forward.normalize_or_zero();
        if forward == Vec3::ZERO {
            return false;
        }
        let center = self.bodies[ball.index()].position;
        let tip = center - forward * clearance;
        let butt = tip - forward * length;

        if tip.y - radius < 0.0 && butt.y - radius < 0.0 {
            return true;
        }
        if self
            .rail_boxes(radius)
            .iter()
            .any(|(min, max)| segment_hits_box(tip, butt, *min, *max))
        {
            return true;
        }
        BallRole::ALL
            .iter()
            .filter(|&&other| other != ball)
            .any(|&other| {
                let p = self.bodies[other.index()].position;
                point_segment_distance(p, tip, butt) < self.config.ball_radius + radius
            })
    }
}
