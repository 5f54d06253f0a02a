// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request PDUs sent by a master.

use super::{byte_count, check_count, encode};
use crate::{
    error::Result,
    frame::{Address, FunctionCode, Pdu, Quantity, Word},
    util::{bool_to_u16_coil, pack_coils},
};

pub const MAX_READ_COILS: usize = 2000;
pub const MAX_READ_REGISTERS: usize = 125;
pub const MAX_WRITE_COILS: usize = 1968;
pub const MAX_WRITE_REGISTERS: usize = 123;
pub const MAX_READ_WRITE_REGISTERS: usize = 121;

fn read_request(code: FunctionCode, address: Address, quantity: Quantity) -> Result<Pdu> {
    encode(5, |w| {
        w.put_u8(code.value())?.put_u16(address)?.put_u16(quantity)?;
        Ok(())
    })
}

fn bare_request(code: FunctionCode) -> Result<Pdu> {
    encode(1, |w| {
        w.put_u8(code.value())?;
        Ok(())
    })
}

pub fn read_coils(address: Address, quantity: Quantity) -> Result<Pdu> {
    check_count("coils", quantity.into(), 1, MAX_READ_COILS)?;
    read_request(FunctionCode::ReadCoils, address, quantity)
}

pub fn read_discrete_inputs(address: Address, quantity: Quantity) -> Result<Pdu> {
    check_count("inputs", quantity.into(), 1, MAX_READ_COILS)?;
    read_request(FunctionCode::ReadDiscreteInputs, address, quantity)
}

pub fn read_holding_registers(address: Address, quantity: Quantity) -> Result<Pdu> {
    check_count("registers", quantity.into(), 1, MAX_READ_REGISTERS)?;
    read_request(FunctionCode::ReadHoldingRegisters, address, quantity)
}

pub fn read_input_registers(address: Address, quantity: Quantity) -> Result<Pdu> {
    check_count("registers", quantity.into(), 1, MAX_READ_REGISTERS)?;
    read_request(FunctionCode::ReadInputRegisters, address, quantity)
}

pub fn write_single_coil(address: Address, state: bool) -> Result<Pdu> {
    encode(5, |w| {
        w.put_u8(FunctionCode::WriteSingleCoil.value())?
            .put_u16(address)?
            .put_u16(bool_to_u16_coil(state))?;
        Ok(())
    })
}

pub fn write_single_register(address: Address, value: Word) -> Result<Pdu> {
    encode(5, |w| {
        w.put_u8(FunctionCode::WriteSingleRegister.value())?
            .put_u16(address)?
            .put_u16(value)?;
        Ok(())
    })
}

pub fn read_exception_status() -> Result<Pdu> {
    bare_request(FunctionCode::ReadExceptionStatus)
}

pub fn diagnostics(sub_function: Word, data: Word) -> Result<Pdu> {
    encode(5, |w| {
        w.put_u8(FunctionCode::Diagnostics.value())?
            .put_u16(sub_function)?
            .put_u16(data)?;
        Ok(())
    })
}

pub fn get_comm_event_counter() -> Result<Pdu> {
    bare_request(FunctionCode::GetCommEventCounter)
}

pub fn get_comm_event_log() -> Result<Pdu> {
    bare_request(FunctionCode::GetCommEventLog)
}

/// Coils are bit packed, LSB first.
pub fn write_multiple_coils(address: Address, coils: &[bool]) -> Result<Pdu> {
    check_count("coils", coils.len(), 1, MAX_WRITE_COILS)?;
    let packed = pack_coils(coils);
    let count = byte_count(packed.len())?;
    encode(6 + packed.len(), |w| {
        w.put_u8(FunctionCode::WriteMultipleCoils.value())?
            .put_u16(address)?
            .put_u16(coils.len() as Quantity)?
            .put_u8(count)?
            .put_bytes(&packed)?;
        Ok(())
    })
}

pub fn write_multiple_registers(address: Address, registers: &[Word]) -> Result<Pdu> {
    check_count("registers", registers.len(), 1, MAX_WRITE_REGISTERS)?;
    let count = byte_count(registers.len() * 2)?;
    encode(6 + registers.len() * 2, |w| {
        w.put_u8(FunctionCode::WriteMultipleRegisters.value())?
            .put_u16(address)?
            .put_u16(registers.len() as Quantity)?
            .put_u8(count)?;
        for register in registers {
            w.put_u16(*register)?;
        }
        Ok(())
    })
}

pub fn report_slave_id() -> Result<Pdu> {
    bare_request(FunctionCode::ReportSlaveId)
}

pub fn mask_write_register(address: Address, and_mask: Word, or_mask: Word) -> Result<Pdu> {
    encode(7, |w| {
        w.put_u8(FunctionCode::MaskWriteRegister.value())?
            .put_u16(address)?
            .put_u16(and_mask)?
            .put_u16(or_mask)?;
        Ok(())
    })
}

pub fn read_write_multiple_registers(
    read_address: Address,
    read_quantity: Quantity,
    write_address: Address,
    registers: &[Word],
) -> Result<Pdu> {
    check_count("read registers", read_quantity.into(), 1, MAX_READ_REGISTERS)?;
    check_count(
        "write registers",
        registers.len(),
        1,
        MAX_READ_WRITE_REGISTERS,
    )?;
    let count = byte_count(registers.len() * 2)?;
    encode(10 + registers.len() * 2, |w| {
        w.put_u8(FunctionCode::ReadWriteMultipleRegisters.value())?
            .put_u16(read_address)?
            .put_u16(read_quantity)?
            .put_u16(write_address)?
            .put_u16(registers.len() as Quantity)?
            .put_u8(count)?;
        for register in registers {
            w.put_u16(*register)?;
        }
        Ok(())
    })
}

pub fn read_fifo_queue(pointer: Address) -> Result<Pdu> {
    encode(3, |w| {
        w.put_u8(FunctionCode::ReadFifoQueue.value())?
            .put_u16(pointer)?;
        Ok(())
    })
}
