//! Slash commands and the reschedule-request button workflow.
//!
//! This layer only parses interactions and renders engine results; the
//! scheduling rules themselves live in [`crate::scheduler`].

use {
    std::sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    serenity::all::{
        ButtonStyle,
        ChannelId,
        Colour,
        CommandInteraction,
        CommandOptionType,
        ComponentInteraction,
        Context,
        CreateActionRow,
        CreateButton,
        CreateCommand,
        CreateCommandOption,
        CreateEmbed,
        CreateEmbedAuthor,
        CreateInteractionResponse,
        CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
        CreateMessage,
        EditMessage,
        EventHandler,
        Interaction,
        MessageId,
        Ready,
        ResolvedOption,
        ResolvedValue,
        UserId,
    },
    serenity::prelude::TypeMapKey,
    tokio::sync::RwLock,
    crate::{
        prelude::*,
        roster::{
            self,
            BracketMatch,
            MatchLayout,
            QualifierLayout,
        },
        scheduler::{
            self,
            SlotColumns,
        },
        sheets::{
            self,
            SheetRange,
        },
        stage::{
            self,
            StageCalendar,
        },
        team::{
            self,
            PlayerDirectory,
            RefereeDirectory,
        },
    },
};

const RESCHEDULE_TIMEOUT: Duration = Duration::from_secs(259_200); // 3 days
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

const ACCEPT_BUTTON: &str = "reschedule_accept";
const DECLINE_BUTTON: &str = "reschedule_decline";
const CANCEL_BUTTON: &str = "reschedule_cancel";

/// Deliberately doesn't distinguish "not in the CSV" from "duplicate CSV
/// rows"; admins have to check the file either way.
const UNREGISTERED_MESSAGE: &str = "You don't appear to be a team captain (or solo player) registered in this tournament. Please contact a tournament admin if you believe this is a mistake.";
const GENERIC_FAULT_MESSAGE: &str = "Oops, an error with the bot occurred. Please let a tournament admin know.";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Directory(#[from] team::Error),
    #[error(transparent)] Serenity(#[from] serenity::Error),
    #[error(transparent)] Sheets(#[from] sheets::Error),
    #[error("player slot columns are misconfigured")]
    SlotColumns,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RescheduleStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl RescheduleStatus {
    fn label(&self) -> &'static str {
        match self {
            Self::Pending => "🟡 Awaiting Response",
            Self::Accepted => "🟢 Accepted",
            Self::Declined => "🔴 Declined",
            Self::Cancelled => "⚪ Cancelled",
        }
    }

    fn colour(&self) -> Colour {
        match self {
            Self::Pending => Colour::from_rgb(253, 203, 88),
            Self::Accepted => Colour::from_rgb(120, 177, 89),
            Self::Declined => Colour::from_rgb(221, 46, 68),
            Self::Cancelled => Colour::from_rgb(230, 231, 232),
        }
    }
}

/// A reschedule request waiting on the opponent, keyed by the request
/// message in [`PendingReschedules`]. Only the opponent may accept or
/// decline, only the requester may cancel, and after
/// [`RESCHEDULE_TIMEOUT`] the sweeper takes the buttons away.
#[derive(Clone)]
pub(crate) struct PendingReschedule {
    bracket_match: BracketMatch,
    new_time: DateTime<Utc>,
    requester: UserId,
    requester_team: String,
    opponent: UserId,
    channel: ChannelId,
    expires: DateTime<Utc>,
    thumbnail: Option<String>,
}

pub(crate) enum PendingReschedules {}

impl TypeMapKey for PendingReschedules {
    type Value = Arc<RwLock<HashMap<MessageId, PendingReschedule>>>;
}

fn commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("qualifier")
            .description("Qualifier lobby scheduling")
            .add_option(CreateCommandOption::new(CommandOptionType::SubCommand, "set", "Schedule or reschedule a qualifier lobby.")
                .add_sub_option(CreateCommandOption::new(CommandOptionType::String, "match_id", "The ID of the lobby to sign up for")
                    .required(true))),
        CreateCommand::new("reschedule")
            .description("Send a request to an opponent to reschedule a match.")
            .add_option(CreateCommandOption::new(CommandOptionType::String, "match_id", "The ID of the match to reschedule")
                .required(true))
            .add_option(CreateCommandOption::new(CommandOptionType::Integer, "weekday", "The new day of the week")
                .add_int_choice("Monday", 0)
                .add_int_choice("Tuesday", 1)
                .add_int_choice("Wednesday", 2)
                .add_int_choice("Thursday", 3)
                .add_int_choice("Friday", 4)
                .add_int_choice("Saturday", 5)
                .add_int_choice("Sunday", 6)
                .required(true))
            .add_option(CreateCommandOption::new(CommandOptionType::Integer, "hour", "The new hour (UTC, 24-hour clock)")
                .min_int_value(0)
                .max_int_value(23)
                .required(true))
            .add_option(CreateCommandOption::new(CommandOptionType::Integer, "minute", "The new minute")
                .min_int_value(0)
                .max_int_value(59)
                .required(false)),
    ]
}

fn str_option<'a>(options: &'a [ResolvedOption<'a>], name: &str) -> Option<&'a str> {
    options.iter().find_map(|opt| match opt.value {
        ResolvedValue::String(value) if opt.name == name => Some(value),
        _ => None,
    })
}

fn int_option(options: &[ResolvedOption<'_>], name: &str) -> Option<i64> {
    options.iter().find_map(|opt| match opt.value {
        ResolvedValue::Integer(value) if opt.name == name => Some(value),
        _ => None,
    })
}

fn reschedule_embed(status: RescheduleStatus, match_id: &str, old_time: DateTime<Utc>, new_time: DateTime<Utc>, requester_team: &str, thumbnail: Option<&str>) -> CreateEmbed {
    const TIME_FORMAT: &str = "%a, %b %-d at %-H:%M UTC";

    let mut embed = CreateEmbed::new()
        .title(format!("Match ID: {match_id}"))
        .colour(status.colour())
        .author(CreateEmbedAuthor::new(format!("{requester_team} wants to reschedule")))
        .field("Old Time", format!("{}\n(<t:{}:F>)", old_time.format(TIME_FORMAT), old_time.timestamp()), false)
        .field("New Time", format!("{}\n(<t:{}:F>)", new_time.format(TIME_FORMAT), new_time.timestamp()), false)
        .field("Status", status.label(), false);
    if let Some(url) = thumbnail {
        embed = embed.thumbnail(url);
    }
    embed
}

fn reschedule_buttons() -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(ACCEPT_BUTTON).label("Accept").style(ButtonStyle::Success),
        CreateButton::new(DECLINE_BUTTON).label("Decline").style(ButtonStyle::Danger),
        CreateButton::new(CANCEL_BUTTON).label("Cancel").style(ButtonStyle::Secondary),
    ])]
}

pub(crate) struct Handler {
    config: Config,
    http_client: reqwest::Client,
    sweeper_started: AtomicBool,
}

impl Handler {
    pub(crate) fn new(config: Config, http_client: reqwest::Client) -> Self {
        Self {
            sweeper_started: AtomicBool::default(),
            config, http_client,
        }
    }

    async fn follow_up(&self, ctx: &Context, interaction: &CommandInteraction, content: impl Into<String>) -> Result<(), Error> {
        interaction.create_followup(&ctx.http, CreateInteractionResponseFollowup::new().content(content)).await?;
        Ok(())
    }

    async fn apply_deltas(&self, worksheet: &str, deltas: Vec<scheduler::RowDelta>) -> Result<(), sheets::Error> {
        sheets::batch_update_values(
            &self.http_client,
            &self.config.google_service_account,
            &self.config.spreadsheet_id,
            deltas.into_iter().map(|delta| (format!("{worksheet}!{}", delta.range), delta.values)).collect(),
        ).await
    }

    async fn qualifier_set(&self, ctx: &Context, interaction: &CommandInteraction) -> Result<(), Error> {
        interaction.create_response(&ctx.http, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new())).await?;
        let options = interaction.data.options();
        let Some(ResolvedOption { value: ResolvedValue::SubCommand(sub_options), .. }) = options.into_iter().find(|opt| opt.name == "set") else {
            warn!("/qualifier called without the set subcommand");
            return Ok(())
        };
        let Some(lobby_id) = str_option(&sub_options, "match_id") else {
            warn!("/qualifier set called without a match_id");
            return Ok(())
        };
        let lobby_id = lobby_id.to_uppercase();
        let players = PlayerDirectory::load(&self.config.players_csv)?;
        let Some(player) = players.by_discord_name(&interaction.user.name) else {
            return self.follow_up(ctx, interaction, UNREGISTERED_MESSAGE).await
        };
        let referees = RefereeDirectory::load(&self.config.referees_csv)?;
        let sheet = &self.config.qualifiers;
        let range = SheetRange::parse(&sheet.range)?;
        let rows = sheets::read_table(&self.http_client, &self.config.google_service_account, &self.config.spreadsheet_id, &sheet.worksheet, &range, &sheet.date_col, &sheet.time_col).await?;
        let layout = QualifierLayout::new(sheet.slot_count().ok_or(Error::SlotColumns)?);
        let mut lobbies = roster::load_qualifiers(&rows, &layout, &players, &referees);
        let slots = SlotColumns { start: sheet.slots_start.clone(), end: sheet.slots_end.clone() };
        match scheduler::claim_slot(&mut lobbies, &lobby_id, &player, &slots) {
            Ok((_, deltas)) => {
                self.apply_deltas(&sheet.worksheet, deltas).await?;
                info!("{} signed up for qualifier lobby {lobby_id}", player.team_name);
                self.follow_up(ctx, interaction, format!("**{}**, you have successfully signed up for lobby **{lobby_id}**!", player.team_name)).await
            }
            Err(scheduler::Error::LobbyNotFound(_)) => self.follow_up(ctx, interaction, format!("Lobby **{lobby_id}** was not found!")).await,
            Err(scheduler::Error::FullLobby(_)) => self.follow_up(ctx, interaction, format!("Lobby **{lobby_id}** is full!")).await,
            Err(scheduler::Error::SameLobby(_)) => self.follow_up(ctx, interaction, format!("You are already scheduled in lobby **{lobby_id}**!")).await,
            Err(e) => {
                error!("unexpected claim error for lobby {lobby_id}: {e}");
                self.follow_up(ctx, interaction, GENERIC_FAULT_MESSAGE).await
            }
        }
    }

    async fn reschedule(&self, ctx: &Context, interaction: &CommandInteraction) -> Result<(), Error> {
        interaction.create_response(&ctx.http, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new())).await?;
        let options = interaction.data.options();
        let (Some(match_id), Some(weekday), Some(hour)) = (str_option(&options, "match_id"), int_option(&options, "weekday"), int_option(&options, "hour")) else {
            warn!("/reschedule called with missing options");
            return Ok(())
        };
        let match_id = match_id.to_uppercase();
        let weekday = match weekday {
            0 => Weekday::Mon,
            1 => Weekday::Tue,
            2 => Weekday::Wed,
            3 => Weekday::Thu,
            4 => Weekday::Fri,
            5 => Weekday::Sat,
            6 => Weekday::Sun,
            n => {
                warn!("/reschedule called with out-of-range weekday {n}");
                return Ok(())
            }
        };
        let minute = int_option(&options, "minute").unwrap_or_default();
        let players = PlayerDirectory::load(&self.config.players_csv)?;
        let Some(player) = players.by_discord_name(&interaction.user.name) else {
            return self.follow_up(ctx, interaction, UNREGISTERED_MESSAGE).await
        };
        let calendar = StageCalendar::new(&self.config.stages);
        let today = Utc::now().date_naive();
        let new_time = match calendar.resolve(today, weekday, hour as u32, minute as u32) {
            Ok(new_time) => new_time,
            Err(stage::Error::StageNotFound(_)) => return self.follow_up(ctx, interaction, "Reschedules are currently unavailable.").await,
        };
        if let Some(current_stage) = calendar.stage_for(today) {
            info!("reschedule request for {match_id} resolved against stage {current_stage}");
        }
        let referees = RefereeDirectory::load(&self.config.referees_csv)?;
        let sheet = &self.config.bracket;
        let range = SheetRange::parse(&sheet.range)?;
        let rows = sheets::read_table(&self.http_client, &self.config.google_service_account, &self.config.spreadsheet_id, &sheet.worksheet, &range, &sheet.date_col, &sheet.time_col).await?;
        let matches = roster::load_matches(&rows, &MatchLayout::default(), &players, &referees);
        let bracket_match = match scheduler::validate_reschedule(&matches, &match_id, &player) {
            Ok(bracket_match) => bracket_match.clone(),
            Err(scheduler::Error::LobbyNotFound(_)) => return self.follow_up(ctx, interaction, format!("Match **{match_id}** was not found!")).await,
            Err(_) => return self.follow_up(ctx, interaction, "You don't appear to be a participant of this match. Please contact a tournament admin if you believe this is a mistake.").await,
        };
        let Some(opponent) = [&bracket_match.player1, &bracket_match.player2].into_iter().flatten().find(|opponent| **opponent != player).cloned() else {
            return self.follow_up(ctx, interaction, "Your opponent doesn't appear to be registered in this tournament. Please contact a tournament admin.").await
        };
        let Some(guild_id) = interaction.guild_id else {
            return self.follow_up(ctx, interaction, "Reschedule requests only work from within the tournament server.").await
        };
        let Some(member) = guild_id.search_members(&ctx.http, &opponent.discord_name, Some(10)).await?
            .into_iter().find(|member| member.user.name == opponent.discord_name) else {
                warn!("opponent {} not found in guild {guild_id}", opponent.discord_name);
                return self.follow_up(ctx, interaction, "Your opponent couldn't be found on this server. Please contact a tournament admin.").await
            };
        let thumbnail = guild_id.to_partial_guild(&ctx.http).await.ok().and_then(|guild| guild.icon_url());
        let embed = reschedule_embed(RescheduleStatus::Pending, &match_id, bracket_match.lobby.time, new_time, &player.team_name, thumbnail.as_deref());
        let message = interaction.create_followup(&ctx.http, CreateInteractionResponseFollowup::new()
            .content(format!("<@{}>", member.user.id))
            .embed(embed)
            .components(reschedule_buttons())).await?;
        let pending_map = ctx.data.read().await.get::<PendingReschedules>().cloned();
        if let Some(pending_map) = pending_map {
            pending_map.write().await.insert(message.id, PendingReschedule {
                new_time,
                requester: interaction.user.id,
                requester_team: player.team_name,
                opponent: member.user.id,
                channel: message.channel_id,
                expires: Utc::now() + RESCHEDULE_TIMEOUT,
                bracket_match, thumbnail,
            });
        }
        Ok(())
    }

    async fn component(&self, ctx: &Context, interaction: &ComponentInteraction) -> Result<(), Error> {
        let Some(pending_map) = ctx.data.read().await.get::<PendingReschedules>().cloned() else { return Ok(()) };
        let message_id = interaction.message.id;
        let Some(pending) = pending_map.read().await.get(&message_id).cloned() else {
            // stale buttons from before a restart
            interaction.create_response(&ctx.http, CreateInteractionResponse::Acknowledge).await?;
            return Ok(())
        };
        let actor = interaction.user.id;
        let status = match &*interaction.data.custom_id {
            ACCEPT_BUTTON if actor == pending.opponent => RescheduleStatus::Accepted,
            DECLINE_BUTTON if actor == pending.opponent => RescheduleStatus::Declined,
            CANCEL_BUTTON if actor == pending.requester => RescheduleStatus::Cancelled,
            _ => {
                // not the addressed party, ignore the click
                interaction.create_response(&ctx.http, CreateInteractionResponse::Acknowledge).await?;
                return Ok(())
            }
        };
        if status == RescheduleStatus::Accepted {
            let sheet = &self.config.bracket;
            let deltas = scheduler::apply_reschedule(&pending.bracket_match, pending.new_time, &sheet.date_col, &sheet.time_col);
            self.apply_deltas(&sheet.worksheet, deltas).await?;
            info!("match {} rescheduled to {}", pending.bracket_match.lobby.id, pending.new_time);
        }
        pending_map.write().await.remove(&message_id);
        interaction.create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(CreateInteractionResponseMessage::new()
            .embed(reschedule_embed(status, &pending.bracket_match.lobby.id, pending.bracket_match.lobby.time, pending.new_time, &pending.requester_team, pending.thumbnail.as_deref()))
            .components(Vec::default()))).await?;
        if status == RescheduleStatus::Accepted {
            let mut mentions = format!("<@{}>", pending.requester);
            if let (Some(referee), Some(guild_id)) = (&pending.bracket_match.lobby.referee, interaction.guild_id) {
                match guild_id.search_members(&ctx.http, &referee.discord_name, Some(10)).await {
                    Ok(members) => if let Some(member) = members.into_iter().find(|member| member.user.name == referee.discord_name) {
                        mentions.push_str(&format!(" <@{}>", member.user.id));
                    } else {
                        warn!("referee {} not found in guild {guild_id}", referee.discord_name);
                    },
                    Err(e) => warn!("couldn't look up referee {}: {e}", referee.discord_name),
                }
            }
            interaction.channel_id.send_message(&ctx.http, CreateMessage::new().content(format!("{mentions} This match has been rescheduled."))).await?;
        }
        Ok(())
    }
}

/// Removes expired reschedule requests and takes the buttons off their
/// messages. The embed itself is left showing the pending status.
async fn expire_pending_reschedules(ctx: Context) {
    let mut interval = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let Some(pending_map) = ctx.data.read().await.get::<PendingReschedules>().cloned() else { continue };
        let now = Utc::now();
        let expired = {
            let mut pending_map = pending_map.write().await;
            let expired_ids = pending_map.iter()
                .filter(|(_, pending)| pending.expires <= now)
                .map(|(message_id, _)| *message_id)
                .collect::<Vec<_>>();
            expired_ids.into_iter()
                .filter_map(|message_id| pending_map.remove(&message_id).map(|pending| (message_id, pending)))
                .collect::<Vec<_>>()
        };
        for (message_id, pending) in expired {
            if let Err(e) = pending.channel.edit_message(&ctx.http, message_id, EditMessage::new().components(Vec::default())).await {
                warn!("failed to expire reschedule request {message_id}: {e}");
            }
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("logged in as {}", ready.user.name);
        for guild in &self.config.discord.guilds {
            if let Err(e) = guild.set_commands(&ctx.http, commands()).await {
                error!("failed to register commands in guild {guild}: {e}");
            }
        }
        if !self.sweeper_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(expire_pending_reschedules(ctx));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(interaction) => {
                let result = match &*interaction.data.name {
                    "qualifier" => self.qualifier_set(&ctx, &interaction).await,
                    "reschedule" => self.reschedule(&ctx, &interaction).await,
                    name => {
                        warn!("unknown command /{name}");
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    error!("error handling /{}: {e}", interaction.data.name);
                    let _ = self.follow_up(&ctx, &interaction, GENERIC_FAULT_MESSAGE).await;
                }
            }
            Interaction::Component(interaction) => {
                if let Err(e) = self.component(&ctx, &interaction).await {
                    error!("error handling {} button: {e}", interaction.data.custom_id);
                }
            }
            _ => {}
        }
    }
}
