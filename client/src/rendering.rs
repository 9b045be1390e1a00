use crate::game::ClientSyncEngine;
use crate::view::{
    explored_cells, lobby_hint, lobby_lines, screen_for, status_lines, CellKind, Screen, Viewport,
};
use macroquad::prelude::*;
use shared::{MazeModel, VIEWPORT_SIZE};

const BACKGROUND: Color = Color::new(0.1, 0.1, 0.1, 1.0);
const WALL: Color = Color::new(0.2, 0.2, 0.2, 1.0);
const PATH: Color = Color::new(0.95, 0.95, 0.95, 1.0);
const UNEXPLORED: Color = Color::new(0.05, 0.05, 0.05, 1.0);
const START: Color = Color::new(0.0, 0.0, 1.0, 1.0);
const GOAL: Color = Color::new(1.0, 0.0, 0.0, 1.0);

/// Parses `#RRGGBB`, falling back to white
pub fn parse_hex_color(hex: &str) -> Color {
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
    };
    match (hex.starts_with('#'), channel(1..3), channel(3..5), channel(5..7)) {
        (true, Some(r), Some(g), Some(b)) if hex.len() == 7 => Color::from_rgba(r, g, b, 255),
        _ => WHITE,
    }
}

pub struct Renderer {
    title_size: f32,
    text_size: f32,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            title_size: 48.0,
            text_size: 22.0,
        }
    }

    pub fn render(&self, engine: &ClientSyncEngine, address: &str) {
        clear_background(BACKGROUND);

        match screen_for(engine.phase()) {
            Screen::Title => self.draw_title(engine, address),
            Screen::Connecting => self.draw_centered("Connecting...", self.title_size, WHITE),
            Screen::Lobby => self.draw_lobby(engine),
            Screen::Game => self.draw_game(engine),
            Screen::Clear => {
                self.draw_game(engine);
                self.draw_clear(engine);
            }
        }
    }

    fn draw_title(&self, engine: &ClientSyncEngine, address: &str) {
        let cy = screen_height() / 2.0;
        self.draw_centered_at("MAZE RACE", cy - 80.0, self.title_size, WHITE);
        self.draw_centered_at(
            &format!("Server: {}", address),
            cy - 20.0,
            self.text_size,
            LIGHTGRAY,
        );
        self.draw_centered_at(
            "[C] Create room    [J] Join room",
            cy + 20.0,
            self.text_size,
            WHITE,
        );

        if let Some(error) = engine.last_error() {
            self.draw_centered_at(&format!("Error: {}", error), cy + 70.0, self.text_size, RED);
        }
    }

    fn draw_lobby(&self, engine: &ClientSyncEngine) {
        let lines = lobby_lines(engine);
        let x = 40.0;
        let mut y = 60.0;

        draw_text(
            &format!("Players ({}):", lines.len()),
            x,
            y,
            self.text_size + 6.0,
            WHITE,
        );
        for line in &lines {
            y += 32.0;
            let label = if line.is_you {
                format!("> {} (you)", line.id)
            } else {
                format!("> {}", line.id)
            };
            draw_text(&label, x, y, self.text_size, parse_hex_color(&line.color));
        }

        draw_text(lobby_hint(engine), x, y + 50.0, self.text_size, LIGHTGRAY);
        draw_text("[Esc] Leave", x, screen_height() - 30.0, self.text_size, GRAY);
    }

    fn draw_game(&self, engine: &ClientSyncEngine) {
        let (Some(maze), Some(me)) = (engine.maze(), engine.local_player()) else {
            return;
        };

        let view_px = (screen_height() * 0.6).min(screen_width() * 0.45);
        let cell_px = view_px / VIEWPORT_SIZE as f32;
        let view_x = 30.0;
        let view_y = 50.0;

        draw_text(
            &format!("{} (your view: {}x{})", me.id, VIEWPORT_SIZE, VIEWPORT_SIZE),
            view_x,
            view_y - 12.0,
            self.text_size,
            WHITE,
        );

        let viewport = Viewport::build(maze, me.position, VIEWPORT_SIZE, engine.players().values());
        for row in 0..VIEWPORT_SIZE {
            for col in 0..VIEWPORT_SIZE {
                let Some(cell) = viewport.cell(col, row) else {
                    continue;
                };
                let x = view_x + col as f32 * cell_px;
                let y = view_y + row as f32 * cell_px;
                draw_rectangle(x, y, cell_px, cell_px, kind_color(cell.kind));

                for (i, id) in cell.occupants.iter().enumerate() {
                    let Some(player) = engine.players().get(id) else {
                        continue;
                    };
                    let inset = cell_px * 0.2 + i as f32 * 3.0;
                    draw_rectangle(
                        x + inset,
                        y + inset,
                        cell_px - inset * 2.0,
                        cell_px - inset * 2.0,
                        parse_hex_color(&player.color),
                    );
                }
            }
        }
        draw_rectangle_lines(view_x, view_y, view_px, view_px, 2.0, WHITE);

        let minimap_x = view_x + view_px + 40.0;
        self.draw_minimap(engine, maze, minimap_x, view_y, view_px);
        self.draw_status(engine, view_x, view_y + view_px + 40.0);
    }

    fn draw_minimap(&self, engine: &ClientSyncEngine, maze: &MazeModel, x: f32, y: f32, size: f32) {
        let cell = size / maze.width().max(maze.height()) as f32;
        draw_rectangle(x, y, cell * maze.width() as f32, cell * maze.height() as f32, UNEXPLORED);

        for coord in explored_cells(maze, engine.players().values()) {
            draw_rectangle(
                x + coord.x as f32 * cell,
                y + coord.y as f32 * cell,
                cell,
                cell,
                PATH,
            );
        }

        for (coord, color) in [(maze.start(), START), (maze.goal(), GOAL)] {
            draw_rectangle(x + coord.x as f32 * cell, y + coord.y as f32 * cell, cell, cell, color);
        }

        let my_id = engine.my_id();
        for player in engine.players().values() {
            let px = x + player.position.x as f32 * cell;
            let py = y + player.position.y as f32 * cell;
            draw_rectangle(px, py, cell, cell, parse_hex_color(&player.color));
            if Some(player.id.as_str()) == my_id {
                draw_rectangle_lines(px - 1.0, py - 1.0, cell + 2.0, cell + 2.0, 2.0, WHITE);
            }
        }

        draw_text("Explored map", x, y - 12.0, self.text_size, WHITE);
    }

    fn draw_status(&self, engine: &ClientSyncEngine, x: f32, mut y: f32) {
        for line in status_lines(engine) {
            draw_text(
                &format!("{}: {}", line.id, line.label),
                x,
                y,
                self.text_size,
                parse_hex_color(&line.color),
            );
            y += 26.0;
        }
    }

    fn draw_clear(&self, engine: &ClientSyncEngine) {
        draw_rectangle(
            0.0,
            0.0,
            screen_width(),
            screen_height(),
            Color::new(0.0, 0.0, 0.0, 0.6),
        );

        let winner = engine.winner().unwrap_or("?");
        let headline = if engine.my_id() == Some(winner) {
            "You reached the goal!".to_string()
        } else {
            format!("{} reached the goal!", winner)
        };
        let cy = screen_height() / 2.0;
        self.draw_centered_at(&headline, cy, self.title_size, YELLOW);
        self.draw_centered_at("[Esc] Back to title", cy + 50.0, self.text_size, WHITE);
    }

    fn draw_centered(&self, text: &str, size: f32, color: Color) {
        self.draw_centered_at(text, screen_height() / 2.0, size, color);
    }

    fn draw_centered_at(&self, text: &str, y: f32, size: f32, color: Color) {
        let dims = measure_text(text, None, size as u16, 1.0);
        draw_text(text, (screen_width() - dims.width) / 2.0, y, size, color);
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_color(kind: CellKind) -> Color {
    match kind {
        CellKind::Wall => WALL,
        CellKind::Path => PATH,
        CellKind::Start => START,
        CellKind::Goal => GOAL,
    }
}
