//! Static catalog of Rectangle window arrangements
//!
//! Each action is identified by the name Rectangle expects in
//! `rectangle://execute-action?name=<name>`. The catalog only carries domain
//! facts (category, orientation sensitivity); presentation lookups such as
//! icon resources live in [`icon_resource`], keyed by action.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix of every action id registered with the host
pub const ACTION_ID_PREFIX: &str = "rectangle";

/// Menu grouping of window actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Halves,
    Corners,
    Thirds,
    Fourths,
    Sixths,
    Eighths,
    Ninths,
    General,
    Display,
    Move,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Halves,
        Category::Corners,
        Category::Thirds,
        Category::Fourths,
        Category::Sixths,
        Category::Eighths,
        Category::Ninths,
        Category::General,
        Category::Display,
        Category::Move,
    ];

    /// Actions of this category, in catalog order
    pub fn actions(self) -> impl Iterator<Item = WindowAction> {
        WINDOW_ACTIONS
            .iter()
            .filter(move |spec| spec.category == Some(self))
            .map(|spec| spec.action)
    }

    fn icon_directory(self) -> Option<&'static str> {
        match self {
            Category::Halves => Some("halves"),
            Category::Corners => Some("corners"),
            Category::Thirds => Some("thirds"),
            Category::Fourths => Some("fourths"),
            Category::Sixths => Some("sixths"),
            Category::General => Some("general"),
            Category::Move => Some("move-to-edge"),
            Category::Eighths | Category::Ninths | Category::Display => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Catalog entry describing one window action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    pub action: WindowAction,
    /// Name understood by Rectangle's URL scheme
    pub name: &'static str,
    pub category: Option<Category>,
    /// Whether the visual hint should follow the screen orientation
    pub orientable: bool,
}

macro_rules! window_actions {
    ($($variant:ident => $name:literal, $category:expr, $orientable:literal;)+) => {
        /// Window arrangement understood by Rectangle
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum WindowAction {
            $($variant,)+
        }

        /// Catalog in declaration order; indexed by `WindowAction as usize`
        pub const WINDOW_ACTIONS: &[ActionSpec] = &[
            $(ActionSpec {
                action: WindowAction::$variant,
                name: $name,
                category: $category,
                orientable: $orientable,
            },)+
        ];
    };
}

window_actions! {
    LeftHalf => "left-half", Some(Category::Halves), false;
    RightHalf => "right-half", Some(Category::Halves), false;
    CenterHalf => "center-half", Some(Category::Halves), false;
    TopHalf => "top-half", Some(Category::Halves), false;
    BottomHalf => "bottom-half", Some(Category::Halves), false;

    TopLeft => "top-left", Some(Category::Corners), false;
    TopRight => "top-right", Some(Category::Corners), false;
    BottomLeft => "bottom-left", Some(Category::Corners), false;
    BottomRight => "bottom-right", Some(Category::Corners), false;

    FirstThird => "first-third", Some(Category::Thirds), true;
    CenterThird => "center-third", Some(Category::Thirds), true;
    LastThird => "last-third", Some(Category::Thirds), true;
    FirstTwoThirds => "first-two-thirds", Some(Category::Thirds), true;
    LastTwoThirds => "last-two-thirds", Some(Category::Thirds), true;
    TopLeftThird => "top-left-third", Some(Category::Thirds), false;
    TopRightThird => "top-right-third", Some(Category::Thirds), false;
    BottomLeftThird => "bottom-left-third", Some(Category::Thirds), false;
    BottomRightThird => "bottom-right-third", Some(Category::Thirds), false;

    Maximize => "maximize", Some(Category::General), false;
    AlmostMaximize => "almost-maximize", Some(Category::General), false;
    MaximizeHeight => "maximize-height", Some(Category::General), false;
    Smaller => "smaller", Some(Category::General), false;
    Larger => "larger", Some(Category::General), false;
    Center => "center", Some(Category::General), false;
    CenterProminently => "center-prominently", Some(Category::General), false;
    Restore => "restore", Some(Category::General), false;

    NextDisplay => "next-display", Some(Category::Display), false;
    PreviousDisplay => "previous-display", Some(Category::Display), false;

    MoveLeft => "move-left", Some(Category::Move), false;
    MoveRight => "move-right", Some(Category::Move), false;
    MoveUp => "move-up", Some(Category::Move), false;
    MoveDown => "move-down", Some(Category::Move), false;

    FirstFourth => "first-fourth", Some(Category::Fourths), true;
    SecondFourth => "second-fourth", Some(Category::Fourths), true;
    ThirdFourth => "third-fourth", Some(Category::Fourths), true;
    LastFourth => "last-fourth", Some(Category::Fourths), true;
    FirstThreeFourths => "first-three-fourths", Some(Category::Fourths), true;
    LastThreeFourths => "last-three-fourths", Some(Category::Fourths), true;

    TopLeftSixth => "top-left-sixth", Some(Category::Sixths), false;
    TopCenterSixth => "top-center-sixth", Some(Category::Sixths), false;
    TopRightSixth => "top-right-sixth", Some(Category::Sixths), false;
    BottomLeftSixth => "bottom-left-sixth", Some(Category::Sixths), false;
    BottomCenterSixth => "bottom-center-sixth", Some(Category::Sixths), false;
    BottomRightSixth => "bottom-right-sixth", Some(Category::Sixths), false;

    TopLeftNinth => "top-left-ninth", Some(Category::Ninths), false;
    TopCenterNinth => "top-center-ninth", Some(Category::Ninths), false;
    TopRightNinth => "top-right-ninth", Some(Category::Ninths), false;
    MiddleLeftNinth => "middle-left-ninth", Some(Category::Ninths), false;
    MiddleCenterNinth => "middle-center-ninth", Some(Category::Ninths), false;
    MiddleRightNinth => "middle-right-ninth", Some(Category::Ninths), false;
    BottomLeftNinth => "bottom-left-ninth", Some(Category::Ninths), false;
    BottomCenterNinth => "bottom-center-ninth", Some(Category::Ninths), false;
    BottomRightNinth => "bottom-right-ninth", Some(Category::Ninths), false;

    TopLeftEighth => "top-left-eighth", Some(Category::Eighths), false;
    TopCenterLeftEighth => "top-center-left-eighth", Some(Category::Eighths), false;
    TopCenterRightEighth => "top-center-right-eighth", Some(Category::Eighths), false;
    TopRightEighth => "top-right-eighth", Some(Category::Eighths), false;
    BottomLeftEighth => "bottom-left-eighth", Some(Category::Eighths), false;
    BottomCenterLeftEighth => "bottom-center-left-eighth", Some(Category::Eighths), false;
    BottomCenterRightEighth => "bottom-center-right-eighth", Some(Category::Eighths), false;
    BottomRightEighth => "bottom-right-eighth", Some(Category::Eighths), false;

    CascadeActiveApp => "cascade-active-app", None, false;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown window action: {0}")]
pub struct UnknownWindowAction(pub String);

impl WindowAction {
    pub fn all() -> impl Iterator<Item = WindowAction> {
        WINDOW_ACTIONS.iter().map(|spec| spec.action)
    }

    pub fn spec(self) -> &'static ActionSpec {
        &WINDOW_ACTIONS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn category(self) -> Option<Category> {
        self.spec().category
    }

    pub fn is_orientable(self) -> bool {
        self.spec().orientable
    }

    /// Human readable title, `left-half` becomes `Left Half`
    pub fn title(self) -> String {
        self.name()
            .split('-')
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Host action id, `left-half` becomes `rectangle.LeftHalf`
    pub fn action_id(self) -> String {
        let camel: String = self.name().split('-').map(capitalize).collect();
        format!("{ACTION_ID_PREFIX}.{camel}")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl FromStr for WindowAction {
    type Err = UnknownWindowAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WINDOW_ACTIONS
            .iter()
            .find(|spec| spec.name == s)
            .map(|spec| spec.action)
            .ok_or_else(|| UnknownWindowAction(s.to_string()))
    }
}

impl fmt::Display for WindowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for WindowAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Icon resource for an action, when one is bundled
pub fn icon_resource(action: WindowAction) -> Option<String> {
    let directory = action.category()?.icon_directory()?;
    Some(format!("icons/{directory}/{}.svg", action.name()))
}

/// Rotation in degrees to apply to an action's icon for the current screen
pub fn icon_rotation(action: WindowAction, portrait: bool) -> f64 {
    if portrait && action.is_orientable() {
        90.0
    } else {
        0.0
    }
}
