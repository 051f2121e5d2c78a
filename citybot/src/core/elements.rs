//! Declarative table of the UI elements the bot reacts to.
//!
//! The detection model emits free-form class labels, and several labels can
//! denote the same on-screen element (a renamed class, a spelling with
//! spaces). Every check goes through [`UiElement`] so the alias list and the
//! trust threshold for an element live in one place.
//!
//! Also holds the fixed screen anchors. They assume the game's default
//! 640x480-equivalent layout with the HUD in its stock position.

use crate::core::detection::{DEFAULT_MIN_CONFIDENCE, Detection, Point};

/// Home/city toggle in the bottom-left HUD corner.
pub const HOME_BUTTON: Point = Point::new(31, 450);
/// Neutral tap that closes menus without hitting a building.
pub const SCREEN_CENTER: Point = Point::new(320, 240);
/// Lower-centre tap that dismisses notification banners.
pub const NOTIFICATION_CENTER: Point = Point::new(240, 400);
/// The claim button of a side quest sits this far below the quest indicator.
pub const SIDE_QUEST_CLAIM_OFFSET_Y: i32 = 78;

/// Threshold used for the interstitial clean-up pass.
pub const INTERSTITIAL_MIN_CONFIDENCE: f64 = 0.4;

/// Playable civilizations, as labeled by the tutorial model.
pub const CIVILIZATIONS: &[&str] = &[
    "arabia", "britain", "china", "egypt", "france", "germany", "greece", "japan", "korea", "maya",
    "rome", "spain", "vikings",
];

pub fn is_civilization(label: &str) -> bool {
    CIVILIZATIONS.contains(&label)
}

/// Label shown once `civilization` has been picked on the selection screen.
pub fn selected_label(civilization: &str) -> String {
    format!("{civilization}_selected")
}

/// Logical UI element, independent of the label spelling the model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiElement {
    InCity,
    OnMap,
    ReturnToCity,
    NewFeatureUnlock,
    UpgradeComplete,
    ClickArrow,
    ClickTarget,
    CounselorBubble,
    SkipButton,
    TutorialComplete,
    ConfirmButton,
    BuildArcheryRange,
    BuildConfirm,
    BuildReject,
    MainQuestClaimable,
    SideQuestClaimable,
    QuestsClaimable,
    BuildersHut,
    BuildersHutButton,
    BuildersHutHire,
    TwoQueuesAvailable,
    OneQueueAvailable,
    ExitDialog,
    BuildMenu,
    EconomicTab,
    MilitaryTab,
    AcceptBuildLocation,
    UpgradeButton,
    UpgradeNotAvailable,
    UpgradeConfirm,
    AllianceHelpButton,
    InBuildMenu,
    AllianceInvite,
    HelpChatBubble,
    FarmClickable,
    LumberMillClickable,
    AllianceHelpRequest,
}

/// Elements that pull an incomplete account into the tutorial state.
pub const TUTORIAL_TRIGGERS: [UiElement; 4] = [
    UiElement::ClickArrow,
    UiElement::ClickTarget,
    UiElement::CounselorBubble,
    UiElement::UpgradeComplete,
];

/// Overlays that swallow taps until dismissed, highest priority first.
pub const BLOCKING_INTERSTITIALS: [UiElement; 4] = [
    UiElement::HelpChatBubble,
    UiElement::FarmClickable,
    UiElement::LumberMillClickable,
    UiElement::AllianceHelpRequest,
];

impl UiElement {
    /// Labels denoting this element, in preference order.
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::InCity => &["in_city"],
            Self::OnMap => &["on_map"],
            Self::ReturnToCity => &["return_to_city_button"],
            Self::NewFeatureUnlock => &["new_feature_unlock"],
            Self::UpgradeComplete => &["upgrade_complete"],
            Self::ClickArrow => &["click_arrow"],
            Self::ClickTarget => &["click_target"],
            Self::CounselorBubble => &["counselor text bubble", "counselor_text_bubble"],
            Self::SkipButton => &["skip_button", "skip button"],
            Self::TutorialComplete => &["tutorial_complete"],
            Self::ConfirmButton => &["confirm_button"],
            Self::BuildArcheryRange => &["build_archery_range"],
            Self::BuildConfirm => &["build_confirm_button"],
            Self::BuildReject => &["build_reject_button"],
            Self::MainQuestClaimable => &["main_quest_claimable"],
            Self::SideQuestClaimable => &["side_quest_claimable"],
            Self::QuestsClaimable => &["quests_claimable"],
            Self::BuildersHut => &["builders_hut", "builders_hut_idle"],
            Self::BuildersHutButton => &["builders_hut_button"],
            Self::BuildersHutHire => &["builders_hut_hire_button"],
            Self::TwoQueuesAvailable => &["builders_hut_two_queues_available"],
            Self::OneQueueAvailable => &["builders_hut_build_button"],
            Self::ExitDialog => &["exit_dialog_button"],
            Self::BuildMenu => &["build_available", "build_new_button"],
            Self::EconomicTab => &["build_economic"],
            Self::MilitaryTab => &["build_military"],
            Self::AcceptBuildLocation => &["accept_build_location"],
            Self::UpgradeButton => &[
                "upgrade_button",
                "upgrade_available",
                "upgrade_building",
                "building_upgrade",
            ],
            Self::UpgradeNotAvailable => &["upgrade_not_available"],
            Self::UpgradeConfirm => &["upgrade_available_button", "confirm_button"],
            Self::AllianceHelpButton => &["alliance_help_button"],
            Self::InBuildMenu => &["in_build"],
            Self::AllianceInvite => &["alliance_invite_join"],
            Self::HelpChatBubble => &["help_chat_bubble"],
            Self::FarmClickable => &["farm_clickable"],
            Self::LumberMillClickable => &["lumber_mill_clickable"],
            Self::AllianceHelpRequest => &["alliance_help_request"],
        }
    }

    /// Trust threshold used when the caller does not pick one.
    pub const fn min_confidence(self) -> f64 {
        match self {
            Self::BuildersHutButton | Self::OneQueueAvailable => 0.3,
            Self::TwoQueuesAvailable => 0.6,
            Self::AllianceInvite
            | Self::HelpChatBubble
            | Self::FarmClickable
            | Self::LumberMillClickable
            | Self::AllianceHelpRequest => INTERSTITIAL_MIN_CONFIDENCE,
            _ => DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn matches(self, label: &str) -> bool {
        self.aliases().contains(&label)
    }
}

/// Detection for `element` at its own threshold. Earlier aliases win over
/// later ones; within one alias the first detection in list order wins.
pub fn find(detections: &[Detection], element: UiElement) -> Option<&Detection> {
    find_at(detections, element, element.min_confidence())
}

pub fn find_at(
    detections: &[Detection],
    element: UiElement,
    min_confidence: f64,
) -> Option<&Detection> {
    element.aliases().iter().find_map(|alias| {
        detections
            .iter()
            .find(|d| d.class_name() == *alias && d.is_confident_at(min_confidence))
    })
}

/// Highest-confidence detection for `element` across all of its aliases.
pub fn best(detections: &[Detection], element: UiElement) -> Option<&Detection> {
    let min_confidence = element.min_confidence();
    detections
        .iter()
        .filter(|d| element.matches(d.class_name()) && d.is_confident_at(min_confidence))
        .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))
}

pub fn present(detections: &[Detection], element: UiElement) -> bool {
    find(detections, element).is_some()
}
