use rand::seq::SliceRandom;

use dealgrid_core::{
    message::render_template, DealOffer, MessageContent, RecommendedDeal, UserProfile,
};

use crate::models::Season;

/// Assemble personalized follow-up content: template substitution, an
/// optional incentive and optional injected recommendations.
pub fn compose(
    profile: &UserProfile,
    template: &str,
    offer: Option<DealOffer>,
    recommendations: Vec<RecommendedDeal>,
) -> MessageContent {
    let mut content = MessageContent::plain(render_template(template, profile));
    if let Some(offer) = offer {
        content = content.with_offer(offer);
    }
    if !recommendations.is_empty() {
        content = content.with_recommendations(recommendations);
    }
    content
}

/// Season-specific copy. The variant is picked at random so a long-running
/// campaign does not send the identical line to everyone.
pub fn seasonal_template(season: Season) -> &'static str {
    let variants: &[&'static str] = match season {
        Season::Spring => &[
            "{name}, spring deals are blooming — fresh picks inside",
            "{name}, shake off winter with this week's spring selection",
        ],
        Season::Summer => &[
            "{name}, your summer deal lineup just landed",
            "{name}, hot days, hotter deals — take a look",
        ],
        Season::Autumn => &[
            "{name}, autumn bargains are in — cozy up with these",
            "{name}, harvest season for deals starts now",
        ],
        Season::Winter => &[
            "{name}, warm up with our winter picks",
            "{name}, the winter sale shelf is stocked for you",
        ],
        Season::BlackFriday => &[
            "{name}, Black Friday is live — the best prices of the year",
            "{name}, doors open: your Black Friday shortlist is ready",
        ],
        Season::NewYear => &[
            "{name}, start the year with deals picked for you",
            "{name}, new year, new savings — here is your lineup",
        ],
    };

    variants
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(variants[0])
}

/// Default incentive attached to a season's reminders.
pub fn seasonal_offer(season: Season) -> DealOffer {
    match season {
        Season::BlackFriday => DealOffer::discount("Black Friday special", 30.0, 2),
        Season::NewYear => DealOffer::discount("New year kickoff", 20.0, 7),
        _ => DealOffer::discount("Seasonal pick", 15.0, 7),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn compose_substitutes_and_attaches() {
        let mut profile = UserProfile::new("u-1", Utc::now());
        profile.display_name = Some("Ada".to_string());

        let content = compose(
            &profile,
            "Thanks {name}!",
            Some(DealOffer::discount("Comeback", 10.0, 7)),
            vec![],
        );
        assert_eq!(content.body, "Thanks Ada!");
        assert!(content.offer.is_some());
        assert!(content.recommendations.is_empty());
    }

    #[test]
    fn every_season_has_copy_and_offer() {
        for season in [
            Season::Spring,
            Season::Summer,
            Season::Autumn,
            Season::Winter,
            Season::BlackFriday,
            Season::NewYear,
        ] {
            assert!(seasonal_template(season).contains("{name}"));
            assert!(seasonal_offer(season).discount_percent > 0.0);
        }
    }
}
