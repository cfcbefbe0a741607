use serde::{Deserialize, Serialize};

const EPS: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn approx_eq(self, other: Point) -> bool {
        (self.x - other.x).abs() <= EPS && (self.y - other.y).abs() <= EPS
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

/// Axis-aligned box anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.x - EPS
            && point.x <= self.right() + EPS
            && point.y >= self.y - EPS
            && point.y <= self.bottom() + EPS
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right() + EPS
            && other.x <= self.right() + EPS
            && self.y <= other.bottom() + EPS
            && other.y <= self.bottom() + EPS
    }

    /// True if `other` lies completely inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn expand(&self, margin: f32) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    pub fn distance_to_point(&self, point: Point) -> f32 {
        let dx = if point.x < self.x {
            self.x - point.x
        } else if point.x > self.right() {
            point.x - self.right()
        } else {
            0.0
        };
        let dy = if point.y < self.y {
            self.y - point.y
        } else if point.y > self.bottom() {
            point.y - self.bottom()
        } else {
            0.0
        };
        (dx * dx + dy * dy).sqrt()
    }

    fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.right(), self.bottom()),
            Point::new(self.x, self.bottom()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    pub fn length(&self) -> f32 {
        self.a.distance(self.b)
    }

    pub fn intersects(&self, other: &Segment) -> bool {
        let o1 = orientation(self.a, self.b, other.a);
        let o2 = orientation(self.a, self.b, other.b);
        let o3 = orientation(other.a, other.b, self.a);
        let o4 = orientation(other.a, other.b, self.b);
        let crosses = ((o1 > EPS && o2 < -EPS) || (o1 < -EPS && o2 > EPS))
            && ((o3 > EPS && o4 < -EPS) || (o3 < -EPS && o4 > EPS));
        if crosses {
            return true;
        }
        (o1.abs() <= EPS && on_segment(other.a, self.a, self.b))
            || (o2.abs() <= EPS && on_segment(other.b, self.a, self.b))
            || (o3.abs() <= EPS && on_segment(self.a, other.a, other.b))
            || (o4.abs() <= EPS && on_segment(self.b, other.a, other.b))
    }

    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        if rect.contains_point(self.a) || rect.contains_point(self.b) {
            return true;
        }
        let corners = rect.corners();
        (0..4).any(|idx| self.intersects(&Segment::new(corners[idx], corners[(idx + 1) % 4])))
    }

    pub fn distance_to_point(&self, point: Point) -> f32 {
        let vx = self.b.x - self.a.x;
        let vy = self.b.y - self.a.y;
        let len_sq = vx * vx + vy * vy;
        if len_sq <= f32::EPSILON {
            return self.a.distance(point);
        }
        let t = (((point.x - self.a.x) * vx + (point.y - self.a.y) * vy) / len_sq).clamp(0.0, 1.0);
        Point::new(self.a.x + t * vx, self.a.y + t * vy).distance(point)
    }
}

fn orientation(a: Point, b: Point, c: Point) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(point: Point, a: Point, b: Point) -> bool {
    point.x >= a.x.min(b.x) - EPS
        && point.x <= a.x.max(b.x) + EPS
        && point.y >= a.y.min(b.y) - EPS
        && point.y <= a.y.max(b.y) + EPS
}

/// Bounding box of a polyline, `None` for an empty point list.
pub fn polyline_bounds(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in &points[1..] {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

pub fn polyline_intersects_rect(points: &[Point], rect: &Rect) -> bool {
    match points {
        [] => false,
        [single] => rect.contains_point(*single),
        _ => points
            .windows(2)
            .any(|pair| Segment::new(pair[0], pair[1]).intersects_rect(rect)),
    }
}

pub fn polyline_distance(points: &[Point], point: Point) -> f32 {
    match points {
        [] => f32::INFINITY,
        [single] => single.distance(point),
        _ => points
            .windows(2)
            .map(|pair| Segment::new(pair[0], pair[1]).distance_to_point(point))
            .fold(f32::INFINITY, f32::min),
    }
}

/// Point where the ray from the box center towards `toward` leaves the box.
pub fn intersect_rect_boundary(rect: &Rect, toward: Point) -> Point {
    let center = rect.center();
    let dx = toward.x - center.x;
    let dy = toward.y - center.y;
    let w = rect.width / 2.0;
    let h = rect.height / 2.0;
    if dx.abs() <= f32::EPSILON && dy.abs() <= f32::EPSILON {
        return center;
    }
    let (sx, sy) = if dy.abs() * w > dx.abs() * h {
        let h = if dy < 0.0 { -h } else { h };
        (h * dx / dy, h)
    } else {
        let w = if dx < 0.0 { -w } else { w };
        (w, w * dy / dx)
    };
    Point::new(center.x + sx, center.y + sy)
}

/// Point where the ray from the ellipse center towards `toward` crosses the rim.
pub fn intersect_ellipse(center: Point, rx: f32, ry: f32, toward: Point) -> Point {
    let dx = toward.x - center.x;
    let dy = toward.y - center.y;
    if (dx.abs() <= f32::EPSILON && dy.abs() <= f32::EPSILON) || rx <= 0.0 || ry <= 0.0 {
        return center;
    }
    let scale = 1.0 / ((dx * dx) / (rx * rx) + (dy * dy) / (ry * ry)).sqrt();
    Point::new(center.x + dx * scale, center.y + dy * scale)
}
