/*!
  The human readable textual form of a warrior is called assembly. This module leverages
  the `strum` derives of the instruction related enums to turn assembly text into a byte
  image ready to be loaded into RAM.

  The syntax is line oriented:

  ```text
  % bomb the fixed drop site, then spin
        mov bx, 0x2000
  drop: mov [bx], 0xFC00
        add bx, 2
        jmp drop
  ```

  A line is an optional `label:`, an optional statement, and an optional `%` comment.
  Operands are written as:

    al .. ch, ax, bx, cx, ip    a register binding
    [ax]   [ip+ax]              register-indirect, direct / relative
    1234   0xABCD               an immediate (IMD)
    name                        an immediate carrying the label's address
    [0x40]   [ip+0x40]          a short pointer (PIMD), direct / relative

  Labels resolve to absolute addresses, so a warrior must be assembled at the address it
  will be loaded at. Assembly is two passes: the first sizes every statement and collects
  labels, the second resolves references and encodes.
*/

use std::str::FromStr;

use bimap::BiMap;
use nom::{
  branch::alt,
  bytes::complete::{is_not, tag},
  character::complete::{
    alpha1,
    alphanumeric1,
    char as one_char,
    digit1,
    hex_digit1,
    space0,
    space1
  },
  combinator::{all_consuming, map, map_res, opt, recognize},
  error::ErrorKind,
  multi::{many0, separated_list},
  sequence::{delimited, pair, preceded, terminated, tuple},
  IResult
};
use thiserror::Error;

use super::{
  encode_instruction,
  AccessMode,
  Instruction,
  Location,
  OpCode,
  Operand
};

#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum AssemblyError {
  #[error("line {line}: {name} is not an operation")]
  NotAnOperation { line: usize, name: String },

  #[error("line {line}: {opcode} requires {expected} operands but was given {given}")]
  WrongArity { line: usize, opcode: OpCode, expected: u8, given: usize },

  #[error("line {line}: unreadable statement")]
  Malformed { line: usize },

  #[error("line {line}: duplicate label {name}")]
  DuplicateLabel { line: usize, name: String },

  #[error("line {line}: undefined label {name}")]
  UndefinedLabel { line: usize, name: String },
}

/// The product of assembly: the encoded image and the label table, the latter kept as a
/// bimap so addresses resolve back to names in listings and diagnostics.
#[derive(Clone, Debug)]
pub struct AssembledWarrior {
  pub image:  Vec<u8>,
  pub labels: BiMap<String, u16>,
}

impl AssembledWarrior {
  pub fn address_of(&self, label: &str) -> Option<u16> {
    self.labels.get_by_left(&label.to_string()).copied()
  }

  pub fn label_at(&self, address: u16) -> Option<&str> {
    self.labels.get_by_right(&address).map(String::as_str)
  }
}


// region Operand and line parsers

/// The surface form of one operand before label resolution.
#[derive(Clone, Eq, PartialEq, Debug)]
enum OperandSyntax {
  Register(Location),
  Indirect { pointer: Location, relative: bool },
  Literal(u16),
  LabelRef(String),
  ShortPointer { value: u16, relative: bool },
}

impl OperandSyntax {
  fn occupies_immediate_slot(&self) -> bool {
    match self {
      OperandSyntax::Literal(_)
      | OperandSyntax::LabelRef(_)
      | OperandSyntax::ShortPointer { .. } => true,
      _ => false
    }
  }
}

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0(alt((alphanumeric1, tag("_"))))
    )
  )(input)
}

fn number(input: &str) -> IResult<&str, u16> {
  alt((
    map_res(
      preceded(tag("0x"), hex_digit1),
      |digits: &str| u16::from_str_radix(digits, 16)
    ),
    map_res(digit1, |digits: &str| digits.parse::<u16>()),
  ))(input)
}

//  A bare register name: one of the direct register bindings al..ch, ax..cx, ip.
fn register(input: &str) -> IResult<&str, Location> {
  map_res(identifier, |name: &str| {
    Location::from_str(name.to_ascii_uppercase().as_str())
      .ok()
      .filter(Location::is_register)
      .ok_or(())
  })(input)
}

//  The whole register a pointer location addresses through: `[ax]` et al. accept only
//  ax, bx, cx.
fn pointer_register(input: &str) -> IResult<&str, Location> {
  map_res(register, |location| {
    match location {
      // PAX..PCX sit 4 codes above AX..CX.
      Location::AX | Location::BX | Location::CX => {
        Ok(Location::from(location.code() + 4))
      }
      _ => Err(())
    }
  })(input)
}

//  `[target]` or `[ip+target]` where target is a pointer register or a literal.
fn indirect(input: &str) -> IResult<&str, OperandSyntax> {
  let relative_prefix = opt(
    terminated(tag("ip"), tuple((space0, one_char('+'), space0)))
  );
  delimited(
    terminated(one_char('['), space0),
    map(
      pair(
        relative_prefix,
        alt((
          map(pointer_register, Err),
          map(number, Ok),
        ))
      ),
      |(prefix, target): (Option<&str>, Result<u16, Location>)| {
        let relative = prefix.is_some();
        match target {
          Err(pointer) => OperandSyntax::Indirect { pointer, relative },
          Ok(value)    => OperandSyntax::ShortPointer { value, relative },
        }
      }
    ),
    preceded(space0, one_char(']'))
  )(input)
}

fn operand(input: &str) -> IResult<&str, OperandSyntax> {
  alt((
    indirect,
    map(number, OperandSyntax::Literal),
    map(register, OperandSyntax::Register),
    map(identifier, |name: &str| OperandSyntax::LabelRef(name.to_string())),
  ))(input)
}

type Statement<'a> = (&'a str, Vec<OperandSyntax>);

//  One source line: optional label, optional statement, optional `%` comment.
fn line(input: &str) -> IResult<&str, (Option<&str>, Option<Statement>)> {
  all_consuming(
    map(
      tuple::<&str, _, (&str, ErrorKind), _>((
        space0,
        opt(terminated(identifier, preceded(space0, one_char(':')))),
        space0,
        opt(
          pair(
            identifier,
            map(
              opt(
                preceded(
                  space1,
                  separated_list(
                    delimited(space0, one_char(','), space0),
                    operand
                  )
                )
              ),
              Option::unwrap_or_default
            )
          )
        ),
        space0,
        opt(pair(one_char('%'), opt(is_not("\n\r")))),
      )),
      |(_, label, _, statement, _, _comment)| (label, statement)
    )
  )(input)
}

// endregion

// region Two-pass assembly

/**
  Assembles warrior text into a byte image based at `origin`, the address the image will
  be loaded at. Returns the image together with the resolved label table.
*/
pub fn assemble(text: &str, origin: u16) -> Result<AssembledWarrior, AssemblyError> {
  // Pass 1: parse every line, lay out addresses, and collect the labels.
  let mut statements: Vec<(usize, OpCode, Vec<OperandSyntax>)> = Vec::new();
  let mut labels: BiMap<String, u16> = BiMap::new();
  let mut cursor = origin;

  for (index, raw) in text.lines().enumerate() {
    let line_number = index + 1;
    let (_, (label, statement)) =
      line(raw).map_err(|_| AssemblyError::Malformed { line: line_number })?;

    if let Some(name) = label {
      if labels.insert_no_overwrite(name.to_string(), cursor).is_err() {
        return Err(AssemblyError::DuplicateLabel {
          line: line_number,
          name: name.to_string()
        });
      }
    }

    if let Some((mnemonic, operands)) = statement {
      let opcode = match OpCode::from_str(mnemonic.to_ascii_lowercase().as_str()) {
        Ok(opcode) if opcode != OpCode::Illegal => opcode,
        _ => {
          return Err(AssemblyError::NotAnOperation {
            line: line_number,
            name: mnemonic.to_string()
          });
        }
      };
      if operands.len() != opcode.arity() as usize {
        return Err(AssemblyError::WrongArity {
          line: line_number,
          opcode,
          expected: opcode.arity(),
          given: operands.len()
        });
      }
      let slots = operands.iter().filter(|o| o.occupies_immediate_slot()).count();
      cursor = cursor.wrapping_add(2 + 2 * slots as u16);
      statements.push((line_number, opcode, operands));
    }
  }

  // Pass 2: resolve label references and encode.
  let mut image = Vec::new();
  for (line_number, opcode, operands) in statements {
    let mut encoded = [Operand::none(), Operand::none()];
    for (slot, syntax) in operands.iter().enumerate() {
      encoded[slot] = resolve_operand(syntax, &labels, line_number)?;
    }
    image.extend(encode_instruction(&Instruction {
      opcode,
      operand1: encoded[0],
      operand2: encoded[1],
    }));
  }

  Ok(AssembledWarrior { image, labels })
}

fn resolve_operand(
  syntax: &OperandSyntax,
  labels: &BiMap<String, u16>,
  line: usize
) -> Result<Operand, AssemblyError>
{
  match syntax {

    OperandSyntax::Register(location) => Ok(Operand::direct(*location)),

    OperandSyntax::Indirect { pointer, relative } => {
      Ok(match relative {
        true  => Operand::relative(*pointer),
        false => Operand::direct(*pointer),
      })
    }

    OperandSyntax::Literal(value) => Ok(Operand::immediate(*value)),

    OperandSyntax::LabelRef(name) => {
      match labels.get_by_left(name) {
        Some(address) => Ok(Operand::immediate(*address)),
        None => Err(AssemblyError::UndefinedLabel { line, name: name.clone() }),
      }
    }

    OperandSyntax::ShortPointer { value, relative } => {
      let mode = match relative {
        true  => AccessMode::Relative,
        false => AccessMode::Direct,
      };
      Ok(Operand::short_pointer(*value, mode))
    }

  }
}

// endregion
