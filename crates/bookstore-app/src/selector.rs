// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::find::MAX_FIND_LITERAL;
use crate::working_set::WorkingSet;
use crate::{Entity, Numeral, Pane};

pub const OPTIONS_PROMPT: &str =
    "[Tab] option:     F=Find   C=Create   R=Read   U=Update   D=Delete     Esc=Quit";
pub const FIND_PROMPT: &str =
    "Search literal (or field:literal):                            -> Empty=full set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudOption {
    Find,
    Create,
    Read,
    Update,
    Delete,
}

impl CrudOption {
    pub const ALL: [Self; 5] = [
        Self::Find,
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
    ];

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'F' => Some(Self::Find),
            'C' => Some(Self::Create),
            'R' => Some(Self::Read),
            'U' => Some(Self::Update),
            'D' => Some(Self::Delete),
            _ => None,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Self::Find => 'F',
            Self::Create => 'C',
            Self::Read => 'R',
            Self::Update => 'U',
            Self::Delete => 'D',
        }
    }

    pub const fn verb(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    Grid,
    OptionInput,
    DetailInput(CrudOption),
    FormActive(CrudOption),
}

/// Keys the selector reacts to, independent of the terminal library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKey {
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Left,
    Right,
    Tab,
    Enter,
    Esc,
    Backspace,
    Char(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorOutcome {
    None,
    /// The key is not valid here and was dropped.
    Rejected,
    Find(String),
    ResetFullSet,
    Open {
        option: CrudOption,
        numeral: Option<Numeral>,
    },
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    entity: Entity,
    mode: SelectorMode,
    input: String,
    pane: Pane,
    page_size: usize,
}

impl Selector {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            mode: SelectorMode::Grid,
            input: String::new(),
            pane: Pane::Left,
            page_size: 10,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    pub fn pane(&self) -> Pane {
        self.pane
    }

    /// Text typed into the option or detail field.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_page_size(&mut self, rows: usize) {
        self.page_size = rows.max(1);
    }

    pub fn status_text(&self) -> String {
        match self.mode {
            SelectorMode::Grid | SelectorMode::OptionInput | SelectorMode::FormActive(_) => {
                OPTIONS_PROMPT.to_owned()
            }
            SelectorMode::DetailInput(CrudOption::Find) => FIND_PROMPT.to_owned(),
            SelectorMode::DetailInput(option) => format!("Enter numeral to {}:", option.verb()),
        }
    }

    pub fn press(&mut self, key: SelectorKey, rows: &mut WorkingSet) -> SelectorOutcome {
        match self.mode {
            SelectorMode::Grid => self.press_grid(key, rows),
            SelectorMode::OptionInput => self.press_option(key, rows),
            SelectorMode::DetailInput(option) => self.press_detail(option, key),
            SelectorMode::FormActive(_) => SelectorOutcome::Rejected,
        }
    }

    /// Control came back from a record form, or a lookup failed before it opened.
    pub fn form_closed(&mut self) {
        self.to_grid();
    }

    fn press_grid(&mut self, key: SelectorKey, rows: &mut WorkingSet) -> SelectorOutcome {
        let page = self.page_size as isize;
        match key {
            SelectorKey::Up => rows.move_by(-1),
            SelectorKey::Down => rows.move_by(1),
            SelectorKey::PageUp => rows.move_by(-page),
            SelectorKey::PageDown => rows.move_by(page),
            SelectorKey::Home => rows.select_first(),
            SelectorKey::End => rows.select_last(),
            SelectorKey::Left | SelectorKey::Right => {
                if !self.entity.has_right_pane() {
                    return SelectorOutcome::Rejected;
                }
                self.pane = self.pane.toggled();
            }
            SelectorKey::Tab => {
                self.mode = SelectorMode::OptionInput;
                self.input.clear();
            }
            SelectorKey::Esc => return SelectorOutcome::Exit,
            SelectorKey::Char(letter) => {
                let Some(option) = CrudOption::from_letter(letter) else {
                    return SelectorOutcome::Rejected;
                };
                self.mode = SelectorMode::OptionInput;
                return self.dispatch(option, rows);
            }
            SelectorKey::Enter | SelectorKey::Backspace => return SelectorOutcome::Rejected,
        }
        SelectorOutcome::None
    }

    fn press_option(&mut self, key: SelectorKey, rows: &WorkingSet) -> SelectorOutcome {
        match key {
            SelectorKey::Esc => {
                self.to_grid();
                SelectorOutcome::None
            }
            SelectorKey::Char(letter) => match CrudOption::from_letter(letter) {
                Some(option) => self.dispatch(option, rows),
                None => SelectorOutcome::Rejected,
            },
            _ => SelectorOutcome::Rejected,
        }
    }

    fn dispatch(&mut self, option: CrudOption, rows: &WorkingSet) -> SelectorOutcome {
        self.input.clear();
        match option {
            CrudOption::Create => {
                self.mode = SelectorMode::FormActive(CrudOption::Create);
                SelectorOutcome::Open {
                    option,
                    numeral: None,
                }
            }
            CrudOption::Find => {
                self.mode = SelectorMode::DetailInput(option);
                SelectorOutcome::None
            }
            CrudOption::Read | CrudOption::Update | CrudOption::Delete => {
                if let Some(row) = rows.current() {
                    self.input = row.numeral.to_string();
                }
                self.mode = SelectorMode::DetailInput(option);
                SelectorOutcome::None
            }
        }
    }

    fn press_detail(&mut self, option: CrudOption, key: SelectorKey) -> SelectorOutcome {
        match key {
            SelectorKey::Esc => {
                self.to_grid();
                SelectorOutcome::None
            }
            SelectorKey::Backspace => {
                self.input.pop();
                SelectorOutcome::None
            }
            SelectorKey::Char(ch) => self.type_detail(option, ch),
            SelectorKey::Enter => self.submit_detail(option),
            _ => SelectorOutcome::Rejected,
        }
    }

    fn type_detail(&mut self, option: CrudOption, ch: char) -> SelectorOutcome {
        let accepted = if option == CrudOption::Find {
            !ch.is_control() && self.input.chars().count() < MAX_FIND_LITERAL
        } else {
            ch.is_ascii_digit() && self.input.len() < self.entity.numeral_digits()
        };
        if !accepted {
            return SelectorOutcome::Rejected;
        }
        self.input.push(ch);
        SelectorOutcome::None
    }

    fn submit_detail(&mut self, option: CrudOption) -> SelectorOutcome {
        if option == CrudOption::Find {
            let literal = std::mem::take(&mut self.input);
            self.to_grid();
            if literal.trim().is_empty() {
                return SelectorOutcome::ResetFullSet;
            }
            return SelectorOutcome::Find(literal);
        }
        let Some(numeral) = Numeral::parse(&self.input) else {
            return SelectorOutcome::None;
        };
        self.input.clear();
        self.mode = SelectorMode::FormActive(option);
        SelectorOutcome::Open {
            option,
            numeral: Some(numeral),
        }
    }

    fn to_grid(&mut self) {
        self.mode = SelectorMode::Grid;
        self.input.clear();
    }
}
