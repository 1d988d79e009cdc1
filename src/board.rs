//! Board data: the 40-square track, rent schedules, and card decks.
//!
//! Static prices and rents follow the classic edition. Per-square dynamic
//! state (owner, mortgage flag, improvement level) lives on the deed so
//! the board is the single source of truth for ownership.

use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Cash, PlayerId, SquareId};

/// Number of squares on the track.
pub const BOARD_SIZE: usize = 40;

/// The GO square.
pub const GO: SquareId = 0;

/// The jail square (also "just visiting").
pub const JAIL: SquareId = 10;

// ---------------------------------------------------------------------------
// Squares
// ---------------------------------------------------------------------------

/// Property group. Streets use color groups; railroads and utilities
/// are their own groups for rent scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Brown,
    LightBlue,
    Pink,
    Orange,
    Red,
    Yellow,
    Green,
    DarkBlue,
    Railroad,
    Utility,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Group::Brown => "brown",
            Group::LightBlue => "light_blue",
            Group::Pink => "pink",
            Group::Orange => "orange",
            Group::Red => "red",
            Group::Yellow => "yellow",
            Group::Green => "green",
            Group::DarkBlue => "dark_blue",
            Group::Railroad => "railroad",
            Group::Utility => "utility",
        };
        write!(f, "{s}")
    }
}

/// How a deed computes rent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum RentBasis {
    /// Leveled street rent: [base, 1..4 houses, hotel]. Base doubles
    /// when the owner holds the whole color group unimproved.
    Street { rents: [u32; 6], house_price: u32 },
    /// $25 doubled per additional railroad owned.
    Railroad,
    /// 4x dice with one utility, 10x with both.
    Utility,
}

/// A purchasable square with its dynamic ownership state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deed {
    pub name: String,
    pub price: u32,
    pub group: Group,
    pub basis: RentBasis,
    pub owner: Option<PlayerId>,
    pub mortgaged: bool,
    /// 0–4 houses; 5 is the fully improved (hotel) state.
    pub houses: u8,
}

impl Deed {
    fn new(name: &str, price: u32, group: Group, basis: RentBasis) -> Self {
        Self {
            name: name.to_string(),
            price,
            group,
            basis,
            owner: None,
            mortgaged: false,
            houses: 0,
        }
    }

    fn street(name: &str, price: u32, group: Group, rents: [u32; 6], house_price: u32) -> Self {
        Self::new(name, price, group, RentBasis::Street { rents, house_price })
    }

    fn railroad(name: &str) -> Self {
        Self::new(name, 200, Group::Railroad, RentBasis::Railroad)
    }

    fn utility(name: &str) -> Self {
        Self::new(name, 150, Group::Utility, RentBasis::Utility)
    }

    /// Loan received when mortgaging (half the face price).
    pub fn mortgage_value(&self) -> Cash {
        Decimal::from(self.price / 2)
    }

    /// Cost to lift a mortgage (mortgage value plus 10% interest).
    pub fn unmortgage_cost(&self) -> Cash {
        self.mortgage_value() * Decimal::new(11, 1)
    }

    /// Price of one house on this street, if it is a street.
    pub fn house_price(&self) -> Option<u32> {
        match self.basis {
            RentBasis::Street { house_price, .. } => Some(house_price),
            _ => None,
        }
    }

    /// Cash returned when selling one improvement (half the build cost).
    pub fn house_sale_value(&self) -> Option<Cash> {
        self.house_price().map(|p| Decimal::from(p / 2))
    }

    pub fn is_street(&self) -> bool {
        matches!(self.basis, RentBasis::Street { .. })
    }

    /// Whether the deed carries the fully improved state.
    pub fn has_hotel(&self) -> bool {
        self.houses == 5
    }
}

impl fmt::Display for Deed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = match self.owner {
            Some(id) => format!("P{id}"),
            None => "unowned".to_string(),
        };
        let mortgaged = if self.mortgaged { ", mortgaged" } else { "" };
        let improved = match self.houses {
            0 => String::new(),
            5 => ", hotel".to_string(),
            n => format!(", {n} houses"),
        };
        write!(f, "{} (${}, {owner}{mortgaged}{improved})", self.name, self.price)
    }
}

/// One square on the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "square", rename_all = "snake_case")]
pub enum Square {
    Go,
    JailVisiting,
    FreeParking,
    GoToJail,
    Tax { name: String, amount: u32 },
    Chance,
    CommunityChest,
    Deed(Deed),
}

impl Square {
    /// Human-readable square name.
    pub fn name(&self) -> &str {
        match self {
            Square::Go => "GO",
            Square::JailVisiting => "Jail / Just Visiting",
            Square::FreeParking => "Free Parking",
            Square::GoToJail => "Go To Jail",
            Square::Tax { name, .. } => name,
            Square::Chance => "Chance",
            Square::CommunityChest => "Community Chest",
            Square::Deed(deed) => &deed.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// Effect of a drawn Chance / Community Chest card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum CardEffect {
    /// Move to an exact square, collecting the GO salary when passing.
    Advance { to: SquareId },
    /// Move forward to the nearest railroad (pay double rent if owned)
    /// or utility (pay 10x dice if owned).
    AdvanceToNearest { group: Group },
    /// Treasury pays the participant.
    Receive { amount: u32 },
    /// Participant pays the treasury.
    Pay { amount: u32 },
    /// Every other participant pays the drawer.
    ReceiveFromEachPlayer { amount: u32 },
    /// The drawer pays every other participant.
    PayEachPlayer { amount: u32 },
    GoToJail,
    /// Keepable get-out-of-jail token.
    PardonCard,
    MoveBack { squares: u8 },
    /// Assessed per improvement held.
    StreetRepairs { per_house: u32, per_hotel: u32 },
}

/// A deck card: display text plus its typed effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub text: String,
    pub effect: CardEffect,
}

impl Card {
    fn new(text: &str, effect: CardEffect) -> Self {
        Self {
            text: text.to_string(),
            effect,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// The full track plus both card decks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    squares: Vec<Square>,
    chance: Vec<Card>,
    community_chest: Vec<Card>,
    chance_index: usize,
    chest_index: usize,
}

impl Board {
    /// Build the standard board with decks in canonical order.
    /// Call [`Board::shuffle_decks`] before play for variety.
    pub fn standard() -> Self {
        Self {
            squares: standard_squares(),
            chance: chance_deck(),
            community_chest: community_chest_deck(),
            chance_index: 0,
            chest_index: 0,
        }
    }

    /// Shuffle both decks and reset draw positions.
    pub fn shuffle_decks<R: Rng>(&mut self, rng: &mut R) {
        self.chance.shuffle(rng);
        self.community_chest.shuffle(rng);
        self.chance_index = 0;
        self.chest_index = 0;
    }

    /// Square lookup. `id` must be in 0..40; engine positions are
    /// always reduced modulo the board size.
    pub fn square(&self, id: SquareId) -> &Square {
        &self.squares[id % BOARD_SIZE]
    }

    /// Iterate all squares in track order.
    pub fn squares(&self) -> impl Iterator<Item = (SquareId, &Square)> {
        self.squares.iter().enumerate()
    }

    /// The deed at `id`, if the square is purchasable.
    pub fn deed(&self, id: SquareId) -> Option<&Deed> {
        match self.square(id) {
            Square::Deed(deed) => Some(deed),
            _ => None,
        }
    }

    pub fn deed_mut(&mut self, id: SquareId) -> Option<&mut Deed> {
        match &mut self.squares[id % BOARD_SIZE] {
            Square::Deed(deed) => Some(deed),
            _ => None,
        }
    }

    /// Number of deeds in a group.
    pub fn group_size(&self, group: Group) -> usize {
        self.squares
            .iter()
            .filter(|s| matches!(s, Square::Deed(d) if d.group == group))
            .count()
    }

    /// Number of deeds in `group` owned by `owner`.
    pub fn owned_in_group(&self, owner: PlayerId, group: Group) -> usize {
        self.squares
            .iter()
            .filter(|s| matches!(s, Square::Deed(d) if d.group == group && d.owner == Some(owner)))
            .count()
    }

    /// Whether `owner` holds every deed in `group`.
    pub fn owns_full_group(&self, owner: PlayerId, group: Group) -> bool {
        self.owned_in_group(owner, group) == self.group_size(group)
    }

    /// Deed ids in `group` owned by `owner`, in track order.
    pub fn group_deeds_of(&self, owner: PlayerId, group: Group) -> Vec<SquareId> {
        self.squares
            .iter()
            .enumerate()
            .filter_map(|(id, s)| match s {
                Square::Deed(d) if d.group == group && d.owner == Some(owner) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Total (houses, hotels) held by `owner`, for repair assessments.
    pub fn improvements_of(&self, owner: PlayerId) -> (u32, u32) {
        let mut houses = 0;
        let mut hotels = 0;
        for square in &self.squares {
            if let Square::Deed(d) = square {
                if d.owner == Some(owner) {
                    if d.houses == 5 {
                        hotels += 1;
                    } else {
                        houses += u32::from(d.houses);
                    }
                }
            }
        }
        (houses, hotels)
    }

    /// Rent owed for landing on `id` with the given dice total.
    /// Zero when unowned or mortgaged.
    pub fn rent(&self, id: SquareId, dice_total: u8) -> Cash {
        let Some(deed) = self.deed(id) else {
            return Decimal::ZERO;
        };
        let Some(owner) = deed.owner else {
            return Decimal::ZERO;
        };
        if deed.mortgaged {
            return Decimal::ZERO;
        }

        match &deed.basis {
            RentBasis::Street { rents, .. } => {
                let base = if deed.houses == 0 {
                    if self.owns_full_group(owner, deed.group) {
                        rents[0] * 2
                    } else {
                        rents[0]
                    }
                } else {
                    rents[usize::from(deed.houses.min(5))]
                };
                Decimal::from(base)
            }
            RentBasis::Railroad => {
                let owned = self.owned_in_group(owner, Group::Railroad) as u32;
                if owned == 0 {
                    Decimal::ZERO
                } else {
                    Decimal::from(25 * 2u32.pow(owned - 1))
                }
            }
            RentBasis::Utility => {
                let owned = self.owned_in_group(owner, Group::Utility);
                let multiplier = if owned >= 2 { 10 } else { 4 };
                Decimal::from(multiplier * u32::from(dice_total))
            }
        }
    }

    /// Nearest square of `group` strictly ahead of `from`, wrapping.
    pub fn nearest_in_group(&self, from: SquareId, group: Group) -> Option<SquareId> {
        (1..=BOARD_SIZE)
            .map(|step| (from + step) % BOARD_SIZE)
            .find(|&id| matches!(self.square(id), Square::Deed(d) if d.group == group))
    }

    /// Whether building one more house on `id` respects the rules:
    /// street, owned, unmortgaged group monopoly, below hotel level,
    /// and even development across the group.
    pub fn can_build(&self, owner: PlayerId, id: SquareId) -> Result<(), String> {
        let deed = self
            .deed(id)
            .ok_or_else(|| format!("square {id} is not purchasable"))?;
        if !deed.is_street() {
            return Err(format!("{} cannot be improved", deed.name));
        }
        if deed.owner != Some(owner) {
            return Err(format!("{} is not owned by P{owner}", deed.name));
        }
        if deed.mortgaged {
            return Err(format!("{} is mortgaged", deed.name));
        }
        if deed.houses >= 5 {
            return Err(format!("{} is fully improved", deed.name));
        }
        if !self.owns_full_group(owner, deed.group) {
            return Err(format!("P{owner} does not hold the full {} group", deed.group));
        }
        if self
            .group_deeds_of(owner, deed.group)
            .iter()
            .any(|&other| self.deed(other).map(|d| d.mortgaged).unwrap_or(false))
        {
            return Err(format!("a {} group deed is mortgaged", deed.group));
        }
        let min_houses = self
            .group_deeds_of(owner, deed.group)
            .iter()
            .filter_map(|&other| self.deed(other).map(|d| d.houses))
            .min()
            .unwrap_or(0);
        if deed.houses > min_houses {
            return Err(format!("even development: build elsewhere in {} first", deed.group));
        }
        Ok(())
    }

    /// Whether selling one house from `id` respects even development.
    pub fn can_sell_house(&self, owner: PlayerId, id: SquareId) -> Result<(), String> {
        let deed = self
            .deed(id)
            .ok_or_else(|| format!("square {id} is not purchasable"))?;
        if deed.owner != Some(owner) {
            return Err(format!("{} is not owned by P{owner}", deed.name));
        }
        if deed.houses == 0 {
            return Err(format!("{} has no improvements", deed.name));
        }
        let max_houses = self
            .group_deeds_of(owner, deed.group)
            .iter()
            .filter_map(|&other| self.deed(other).map(|d| d.houses))
            .max()
            .unwrap_or(0);
        if deed.houses < max_houses {
            return Err(format!("even development: sell elsewhere in {} first", deed.group));
        }
        Ok(())
    }

    /// Whether `id` can be mortgaged by `owner`: owned, unmortgaged,
    /// and no improvements anywhere in its street group.
    pub fn can_mortgage(&self, owner: PlayerId, id: SquareId) -> Result<(), String> {
        let deed = self
            .deed(id)
            .ok_or_else(|| format!("square {id} is not purchasable"))?;
        if deed.owner != Some(owner) {
            return Err(format!("{} is not owned by P{owner}", deed.name));
        }
        if deed.mortgaged {
            return Err(format!("{} is already mortgaged", deed.name));
        }
        if deed.is_street() {
            let improved: Vec<SquareId> = self
                .group_deeds_of(owner, deed.group)
                .into_iter()
                .filter(|&other| self.deed(other).map(|d| d.houses > 0).unwrap_or(false))
                .collect();
            if !improved.is_empty() {
                return Err(format!(
                    "sell improvements in the {} group before mortgaging",
                    deed.group
                ));
            }
        }
        Ok(())
    }

    /// Draw the next Chance card, cycling through the deck.
    pub fn draw_chance(&mut self) -> Card {
        let card = self.chance[self.chance_index].clone();
        self.chance_index = (self.chance_index + 1) % self.chance.len();
        card
    }

    /// Draw the next Community Chest card, cycling through the deck.
    pub fn draw_community_chest(&mut self) -> Card {
        let card = self.community_chest[self.chest_index].clone();
        self.chest_index = (self.chest_index + 1) % self.community_chest.len();
        card
    }
}

// ---------------------------------------------------------------------------
// Static data
// ---------------------------------------------------------------------------

fn standard_squares() -> Vec<Square> {
    use Group::*;

    vec![
        Square::Go,
        Square::Deed(Deed::street("Mediterranean Avenue", 60, Brown, [2, 10, 30, 90, 160, 250], 50)),
        Square::CommunityChest,
        Square::Deed(Deed::street("Baltic Avenue", 60, Brown, [4, 20, 60, 180, 320, 450], 50)),
        Square::Tax { name: "Income Tax".to_string(), amount: 200 },
        Square::Deed(Deed::railroad("Reading Railroad")),
        Square::Deed(Deed::street("Oriental Avenue", 100, LightBlue, [6, 30, 90, 270, 400, 550], 50)),
        Square::Chance,
        Square::Deed(Deed::street("Vermont Avenue", 100, LightBlue, [6, 30, 90, 270, 400, 550], 50)),
        Square::Deed(Deed::street("Connecticut Avenue", 120, LightBlue, [8, 40, 100, 300, 450, 600], 50)),
        Square::JailVisiting,
        Square::Deed(Deed::street("St. Charles Place", 140, Pink, [10, 50, 150, 450, 625, 750], 100)),
        Square::Deed(Deed::utility("Electric Company")),
        Square::Deed(Deed::street("States Avenue", 140, Pink, [10, 50, 150, 450, 625, 750], 100)),
        Square::Deed(Deed::street("Virginia Avenue", 160, Pink, [12, 60, 180, 500, 700, 900], 100)),
        Square::Deed(Deed::railroad("Pennsylvania Railroad")),
        Square::Deed(Deed::street("St. James Place", 180, Orange, [14, 70, 200, 550, 750, 950], 100)),
        Square::CommunityChest,
        Square::Deed(Deed::street("Tennessee Avenue", 180, Orange, [14, 70, 200, 550, 750, 950], 100)),
        Square::Deed(Deed::street("New York Avenue", 200, Orange, [16, 80, 220, 600, 800, 1000], 100)),
        Square::FreeParking,
        Square::Deed(Deed::street("Kentucky Avenue", 220, Red, [18, 90, 250, 700, 875, 1050], 150)),
        Square::Chance,
        Square::Deed(Deed::street("Indiana Avenue", 220, Red, [18, 90, 250, 700, 875, 1050], 150)),
        Square::Deed(Deed::street("Illinois Avenue", 240, Red, [20, 100, 300, 750, 925, 1100], 150)),
        Square::Deed(Deed::railroad("B. & O. Railroad")),
        Square::Deed(Deed::street("Atlantic Avenue", 260, Yellow, [22, 110, 330, 800, 975, 1150], 150)),
        Square::Deed(Deed::street("Ventnor Avenue", 260, Yellow, [22, 110, 330, 800, 975, 1150], 150)),
        Square::Deed(Deed::utility("Water Works")),
        Square::Deed(Deed::street("Marvin Gardens", 280, Yellow, [24, 120, 360, 850, 1025, 1200], 150)),
        Square::GoToJail,
        Square::Deed(Deed::street("Pacific Avenue", 300, Green, [26, 130, 390, 900, 1100, 1275], 200)),
        Square::Deed(Deed::street("North Carolina Avenue", 300, Green, [26, 130, 390, 900, 1100, 1275], 200)),
        Square::CommunityChest,
        Square::Deed(Deed::street("Pennsylvania Avenue", 320, Green, [28, 150, 450, 1000, 1200, 1400], 200)),
        Square::Deed(Deed::railroad("Short Line Railroad")),
        Square::Chance,
        Square::Deed(Deed::street("Park Place", 350, DarkBlue, [35, 175, 500, 1100, 1300, 1500], 200)),
        Square::Tax { name: "Luxury Tax".to_string(), amount: 100 },
        Square::Deed(Deed::street("Boardwalk", 400, DarkBlue, [50, 200, 600, 1400, 1700, 2000], 200)),
    ]
}

fn community_chest_deck() -> Vec<Card> {
    vec![
        Card::new("Advance to GO (Collect $200)", CardEffect::Advance { to: GO }),
        Card::new("Bank error in your favor. Collect $200", CardEffect::Receive { amount: 200 }),
        Card::new("Doctor's fees. Pay $50", CardEffect::Pay { amount: 50 }),
        Card::new("From sale of stock you get $50", CardEffect::Receive { amount: 50 }),
        Card::new("Get Out of Jail Free", CardEffect::PardonCard),
        Card::new("Go to Jail. Go directly to jail", CardEffect::GoToJail),
        Card::new(
            "Grand Opera Night. Collect $50 from every player",
            CardEffect::ReceiveFromEachPlayer { amount: 50 },
        ),
        Card::new("Holiday Fund matures. Receive $100", CardEffect::Receive { amount: 100 }),
        Card::new("Income tax refund. Collect $20", CardEffect::Receive { amount: 20 }),
        Card::new(
            "It is your birthday. Collect $10 from every player",
            CardEffect::ReceiveFromEachPlayer { amount: 10 },
        ),
        Card::new("Life insurance matures. Collect $100", CardEffect::Receive { amount: 100 }),
        Card::new("Pay hospital fees of $100", CardEffect::Pay { amount: 100 }),
        Card::new("Pay school fees of $50", CardEffect::Pay { amount: 50 }),
        Card::new("Receive $25 consultancy fee", CardEffect::Receive { amount: 25 }),
        Card::new(
            "You are assessed for street repairs. $40 per house, $115 per hotel",
            CardEffect::StreetRepairs { per_house: 40, per_hotel: 115 },
        ),
        Card::new(
            "You have won second prize in a beauty contest. Collect $10",
            CardEffect::Receive { amount: 10 },
        ),
    ]
}

fn chance_deck() -> Vec<Card> {
    vec![
        Card::new("Advance to GO (Collect $200)", CardEffect::Advance { to: GO }),
        Card::new(
            "Advance to Illinois Ave. If you pass GO, collect $200",
            CardEffect::Advance { to: 24 },
        ),
        Card::new(
            "Advance to St. Charles Place. If you pass GO, collect $200",
            CardEffect::Advance { to: 11 },
        ),
        Card::new(
            "Advance to the nearest Utility. If owned, pay ten times the dice",
            CardEffect::AdvanceToNearest { group: Group::Utility },
        ),
        Card::new(
            "Advance to the nearest Railroad and pay the owner double rent",
            CardEffect::AdvanceToNearest { group: Group::Railroad },
        ),
        Card::new("Bank pays you dividend of $50", CardEffect::Receive { amount: 50 }),
        Card::new("Get Out of Jail Free", CardEffect::PardonCard),
        Card::new("Go Back 3 Spaces", CardEffect::MoveBack { squares: 3 }),
        Card::new("Go to Jail. Go directly to Jail", CardEffect::GoToJail),
        Card::new(
            "Make general repairs on all your property. $25 per house, $100 per hotel",
            CardEffect::StreetRepairs { per_house: 25, per_hotel: 100 },
        ),
        Card::new("Pay poor tax of $15", CardEffect::Pay { amount: 15 }),
        Card::new(
            "Take a trip to Reading Railroad. If you pass GO collect $200",
            CardEffect::Advance { to: 5 },
        ),
        Card::new(
            "You have been elected Chairman of the Board. Pay each player $50",
            CardEffect::PayEachPlayer { amount: 50 },
        ),
        Card::new("Your building loan matures. Collect $150", CardEffect::Receive { amount: 150 }),
        Card::new(
            "Advance token to nearest Railroad and pay the owner double rent",
            CardEffect::AdvanceToNearest { group: Group::Railroad },
        ),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
