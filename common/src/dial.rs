pub const DIAL_RESOLUTION: f32 = 0.2;

pub const RING_ENGAGED: u16 = 0x0001;
pub const RING_OFF: u16 = 0x0000;

const NEGATIVE_RING: [u16; 16] = [
    0x0001, 0x8001, 0xC001, 0xE001, 0xF001, 0xF801, 0xFC01, 0xFE01, 0xFF01, 0xFF81, 0xFFC1,
    0xFFE1, 0xFFF1, 0xFFF9, 0xFFFE, 0xFFFF,
];

const POSITIVE_RING: [u16; 16] = [
    0x0001, 0x0003, 0x0007, 0x000F, 0x001F, 0x003F, 0x007F, 0x00FF, 0x01FF, 0x03FF, 0x07FF,
    0x0FFF, 0x1FFF, 0x3FFF, 0x7FFF, 0xFFFF,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    NoMovement,
    Clockwise,
    CounterClockwise,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Rising,
    Falling,
}

impl Edge {
    fn of(level: bool) -> Self {
        if level {
            Self::Rising
        } else {
            Self::Falling
        }
    }
}

/// Two-phase decoder. Every level change on either line is one step; the
/// direction comes from the edge of the line that moved and the last edge
/// seen on the other line.
#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    a: bool,
    b: bool,
    a_edge: Option<Edge>,
    b_edge: Option<Edge>,
}

impl QuadratureDecoder {
    pub fn new(a: bool, b: bool) -> Self {
        Self {
            a,
            b,
            a_edge: None,
            b_edge: None,
        }
    }

    pub fn decode(&mut self, a: bool, b: bool) -> Rotation {
        let a_changed = a != self.a;
        let b_changed = b != self.b;
        self.a = a;
        self.b = b;

        match (a_changed, b_changed) {
            (false, false) => Rotation::NoMovement,
            (true, true) => {
                self.a_edge = Some(Edge::of(a));
                self.b_edge = Some(Edge::of(b));
                Rotation::Unknown
            }
            (true, false) => {
                let edge = Edge::of(a);
                self.a_edge = Some(edge);
                match (edge, self.b_edge) {
                    (_, None) => Rotation::Unknown,
                    (Edge::Rising, Some(Edge::Rising)) => Rotation::CounterClockwise,
                    (Edge::Rising, Some(Edge::Falling)) => Rotation::Clockwise,
                    (Edge::Falling, Some(Edge::Rising)) => Rotation::Clockwise,
                    (Edge::Falling, Some(Edge::Falling)) => Rotation::CounterClockwise,
                }
            }
            (false, true) => {
                let edge = Edge::of(b);
                self.b_edge = Some(edge);
                match (edge, self.a_edge) {
                    (_, None) => Rotation::Unknown,
                    (Edge::Rising, Some(Edge::Rising)) => Rotation::Clockwise,
                    (Edge::Rising, Some(Edge::Falling)) => Rotation::CounterClockwise,
                    (Edge::Falling, Some(Edge::Rising)) => Rotation::CounterClockwise,
                    (Edge::Falling, Some(Edge::Falling)) => Rotation::Clockwise,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThermostatInputState {
    pub rotation: Rotation,
    pub position: i32,
}

#[derive(Debug, Clone, Default)]
pub struct DialAccumulator {
    input: ThermostatInputState,
    target: f32,
}

impl DialAccumulator {
    pub fn engage(&mut self, baseline: f32) {
        self.input = ThermostatInputState::default();
        self.target = baseline;
    }

    pub fn apply(&mut self, rotation: Rotation) -> bool {
        self.input.rotation = rotation;
        match rotation {
            Rotation::Clockwise => {
                self.input.position += 1;
                self.target += DIAL_RESOLUTION;
                true
            }
            Rotation::CounterClockwise => {
                self.input.position -= 1;
                self.target -= DIAL_RESOLUTION;
                true
            }
            Rotation::NoMovement | Rotation::Unknown => false,
        }
    }

    pub fn reset(&mut self) {
        self.input = ThermostatInputState::default();
    }

    pub fn input(&self) -> ThermostatInputState {
        self.input
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn ring_pattern(&self) -> u16 {
        ring_pattern(self.input.position)
    }
}

pub fn ring_pattern(position: i32) -> u16 {
    let index = ((position.unsigned_abs() / 2) % 15) as usize;
    if position < 0 {
        NEGATIVE_RING[index]
    } else {
        POSITIVE_RING[index]
    }
}
