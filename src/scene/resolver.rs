//! Picks the panorama to show for a requested cell.
//!
//! Lighting fidelity wins over camera direction, and direction wins over
//! giving up: a missing cell is replaced by the same time facing elsewhere,
//! then by the same direction at another time, then by anything on the floor.

use crate::scene::{Direction, FloorCatalog, TimeKey, ViewDescriptor};
use std::fmt;

/// Why the resolved view differs from the one requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    DirectionSubstituted {
        time: TimeKey,
        requested: Direction,
        shown: Direction,
    },
    TimeSubstituted {
        direction: Direction,
        requested: TimeKey,
        shown: TimeKey,
    },
    BothSubstituted {
        requested: (TimeKey, Direction),
        shown: (TimeKey, Direction),
    },
    NoViews {
        floor: u32,
    },
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::DirectionSubstituted {
                time,
                requested,
                shown,
            } => write!(
                f,
                "{requested} view not available at {time}, showing {shown} instead"
            ),
            Fallback::TimeSubstituted {
                direction,
                requested,
                shown,
            } => write!(
                f,
                "{requested} view not available for {direction}, showing {shown} instead"
            ),
            Fallback::BothSubstituted { requested, shown } => write!(
                f,
                "Requested view ({}, {}) not available, showing {} {} instead",
                requested.0, requested.1, shown.0, shown.1
            ),
            Fallback::NoViews { floor } => write!(f, "No views available for floor {floor}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    pub view: Option<&'a ViewDescriptor>,
    /// Cell the view was taken from.
    pub shown: Option<(TimeKey, Direction)>,
    pub fallback: Option<Fallback>,
}

impl<'a> Resolution<'a> {
    fn exact(view: &'a ViewDescriptor, time: TimeKey, direction: Direction) -> Self {
        Self {
            view: Some(view),
            shown: Some((time, direction)),
            fallback: None,
        }
    }

    fn substituted(
        view: &'a ViewDescriptor,
        shown: (TimeKey, Direction),
        fallback: Fallback,
    ) -> Self {
        Self {
            view: Some(view),
            shown: Some(shown),
            fallback: Some(fallback),
        }
    }

    pub fn fallback_reason(&self) -> Option<String> {
        self.fallback.as_ref().map(ToString::to_string)
    }
}

pub fn resolve<'a>(
    floor_id: u32,
    time: TimeKey,
    direction: Direction,
    floor: &'a FloorCatalog,
) -> Resolution<'a> {
    if let Some(view) = floor.view(time, direction) {
        return Resolution::exact(view, time, direction);
    }

    for candidate in Direction::PRIORITY {
        if candidate == direction {
            continue;
        }
        if let Some(view) = floor.view(time, candidate) {
            return Resolution::substituted(
                view,
                (time, candidate),
                Fallback::DirectionSubstituted {
                    time,
                    requested: direction,
                    shown: candidate,
                },
            );
        }
    }

    for candidate in TimeKey::PRIORITY {
        if candidate == time {
            continue;
        }
        if let Some(view) = floor.view(candidate, direction) {
            return Resolution::substituted(
                view,
                (candidate, direction),
                Fallback::TimeSubstituted {
                    direction,
                    requested: time,
                    shown: candidate,
                },
            );
        }
    }

    for candidate_time in TimeKey::PRIORITY {
        for candidate_direction in Direction::PRIORITY {
            if let Some(view) = floor.view(candidate_time, candidate_direction) {
                return Resolution::substituted(
                    view,
                    (candidate_time, candidate_direction),
                    Fallback::BothSubstituted {
                        requested: (time, direction),
                        shown: (candidate_time, candidate_direction),
                    },
                );
            }
        }
    }

    Resolution {
        view: None,
        shown: None,
        fallback: Some(Fallback::NoViews { floor: floor_id }),
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve, Fallback};
    use crate::scene::{Direction, FloorCatalog, TimeKey, ViewDescriptor};

    fn view(name: &str) -> ViewDescriptor {
        ViewDescriptor::equirectangular(format!("/assets/panoramas/{name}.jpg"))
    }

    fn floor_44() -> FloorCatalog {
        FloorCatalog::new(44, "44th Floor", 44)
            .with_view(TimeKey::Noon, Direction::CentralSea, view("noon-sea"))
            .with_view(TimeKey::Noon, Direction::MarineLine, view("noon-marine"))
            .with_view(TimeKey::Sunset, Direction::Stadium, view("sunset-stadium"))
    }

    #[test]
    fn exact_cell_wins_without_reason() {
        let floor = floor_44();
        let resolution = resolve(44, TimeKey::Noon, Direction::MarineLine, &floor);
        assert_eq!(resolution.view, Some(&view("noon-marine")));
        assert_eq!(resolution.fallback, None);
        assert_eq!(
            resolution.shown,
            Some((TimeKey::Noon, Direction::MarineLine))
        );
    }

    #[test]
    fn same_time_is_preferred_over_same_direction() {
        // noon-stadium is missing; sunset-stadium exists but noon alternatives come first.
        let floor = floor_44();
        let resolution = resolve(44, TimeKey::Noon, Direction::Stadium, &floor);
        assert_eq!(resolution.view, Some(&view("noon-sea")));
        assert_eq!(
            resolution.fallback,
            Some(Fallback::DirectionSubstituted {
                time: TimeKey::Noon,
                requested: Direction::Stadium,
                shown: Direction::CentralSea,
            })
        );
        assert_eq!(
            resolution.fallback_reason().as_deref(),
            Some("stadium view not available at noon, showing central-sea instead")
        );
    }

    #[test]
    fn direction_substitution_skips_requested_direction() {
        let floor = FloorCatalog::new(2, "48th Floor", 48)
            .with_view(TimeKey::Night, Direction::Stadium, view("night-stadium"))
            .with_view(TimeKey::Noon, Direction::CentralSea, view("noon-sea"));
        let resolution = resolve(2, TimeKey::Night, Direction::CentralSea, &floor);
        assert_eq!(resolution.view, Some(&view("night-stadium")));
        assert!(matches!(
            resolution.fallback,
            Some(Fallback::DirectionSubstituted { .. })
        ));
    }

    #[test]
    fn missing_time_keeps_direction() {
        let floor = floor_44();
        let resolution = resolve(44, TimeKey::Night, Direction::Stadium, &floor);
        assert_eq!(resolution.view, Some(&view("sunset-stadium")));
        assert_eq!(
            resolution.fallback_reason().as_deref(),
            Some("night view not available for stadium, showing sunset instead")
        );
    }

    #[test]
    fn time_substitution_follows_time_priority() {
        let floor = FloorCatalog::new(3, "52nd Floor", 52)
            .with_view(TimeKey::Sunrise, Direction::MarineLine, view("sunrise-marine"))
            .with_view(TimeKey::Sunset, Direction::MarineLine, view("sunset-marine"));
        let resolution = resolve(3, TimeKey::Night, Direction::MarineLine, &floor);
        assert_eq!(resolution.view, Some(&view("sunset-marine")));
        assert_eq!(
            resolution.shown,
            Some((TimeKey::Sunset, Direction::MarineLine))
        );
    }

    #[test]
    fn any_cell_is_used_when_time_and_direction_both_missing() {
        let floor = FloorCatalog::new(4, "56th Floor", 56)
            .with_view(TimeKey::Night, Direction::MarineLine, view("night-marine"))
            .with_view(TimeKey::Sunrise, Direction::Stadium, view("sunrise-stadium"));
        let resolution = resolve(4, TimeKey::Noon, Direction::CentralSea, &floor);
        // Time priority outer loop: sunrise ranks above night.
        assert_eq!(resolution.view, Some(&view("sunrise-stadium")));
        assert_eq!(
            resolution.fallback_reason().as_deref(),
            Some(
                "Requested view (noon, central-sea) not available, showing sunrise stadium instead"
            )
        );
    }

    #[test]
    fn empty_floor_resolves_to_nothing() {
        let floor = FloorCatalog::new(9, "75th Floor", 75);
        let resolution = resolve(9, TimeKey::Noon, Direction::CentralSea, &floor);
        assert_eq!(resolution.view, None);
        assert_eq!(resolution.shown, None);
        assert_eq!(
            resolution.fallback_reason().as_deref(),
            Some("No views available for floor 9")
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let floor = floor_44();
        for time in TimeKey::ALL {
            for direction in Direction::PRIORITY {
                let first = resolve(44, time, direction, &floor);
                for _ in 0..3 {
                    assert_eq!(resolve(44, time, direction, &floor), first);
                }
            }
        }
    }
}
